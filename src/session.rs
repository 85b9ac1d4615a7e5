use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Process-wide scratch key/value store.
///
/// No TTL, no eviction, no capacity bound.
#[derive(Debug, Default)]
pub struct SessionStorage {
    items: Mutex<HashMap<String, Value>>,
}

impl SessionStorage {
    pub fn create() -> Arc<SessionStorage> {
        Arc::new(SessionStorage::default())
    }

    pub fn get_item(&self, key: &str) -> Option<Value> {
        self.items().get(key).cloned()
    }

    pub fn set_item(&self, key: impl Into<String>, value: Value) {
        self.items().insert(key.into(), value);
    }

    pub fn remove_item(&self, key: &str) {
        self.items().remove(key);
    }

    pub fn clear(&self) {
        self.items().clear();
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    // A poisoned map is still a valid map.
    fn items(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
