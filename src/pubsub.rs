//! In-process publish/subscribe bus.
//!
//! Subscribers are keyed by `(name, event_type)`; subscribing the same pair twice
//! keeps the first registration. `publish` runs every matching callback
//! synchronously, in subscription order, before returning.

use crate::tasks::panic_message;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback invoked with the published payload.
pub type Callback = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub struct Subscriber {
    pub name: String,
    pub event_type: String,
    pub callback: Callback,
}

impl Subscriber {
    pub fn new<F>(name: impl Into<String>, event_type: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            event_type: event_type.into(),
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .finish()
    }
}

/// What `publish` does when a callback returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Log the failure and keep delivering to the remaining subscribers.
    #[default]
    Isolate,
    /// Stop at the first failure and hand it back to the publisher.
    Propagate,
}

/// A callback failure surfaced under `DeliveryPolicy::Propagate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishError {
    pub subscriber: String,
    pub event_type: String,
    pub message: String,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Subscriber '{}' failed on '{}': {}",
            self.subscriber, self.event_type, self.message
        )
    }
}

impl std::error::Error for PublishError {}

#[derive(Debug, Default)]
pub struct PubSub {
    subscribers: Mutex<Vec<Subscriber>>,
    policy: DeliveryPolicy,
}

impl PubSub {
    pub fn create(policy: DeliveryPolicy) -> Arc<PubSub> {
        Arc::new(PubSub {
            subscribers: Mutex::new(Vec::new()),
            policy,
        })
    }

    pub fn subscribe(&self, subscriber: Subscriber) {
        let mut subscribers = self.lock_subscribers();
        let exists = subscribers
            .iter()
            .any(|s| s.name == subscriber.name && s.event_type == subscriber.event_type);
        if exists {
            log::debug!(
                "Subscriber '{}' already listens to '{}'",
                subscriber.name,
                subscriber.event_type
            );
            return;
        }
        subscribers.push(subscriber);
    }

    pub fn unsubscribe(&self, name: &str, event_type: &str) {
        self.lock_subscribers()
            .retain(|s| !(s.name == name && s.event_type == event_type));
    }

    pub fn unsubscribe_all(&self, name: &str) {
        self.lock_subscribers().retain(|s| s.name != name);
    }

    /// Delivers `payload` to every subscriber of `event_type`.
    ///
    /// An empty `event_type` is logged and ignored. Callbacks run without the
    /// subscriber list locked, so they may subscribe or unsubscribe themselves.
    /// A panicking callback counts as a failed one.
    pub fn publish(&self, event_type: &str, payload: &Value) -> Result<(), PublishError> {
        if event_type.is_empty() {
            log::warn!("Ignoring publish without an event type");
            return Ok(());
        }

        let targets: Vec<(String, Callback)> = self
            .lock_subscribers()
            .iter()
            .filter(|s| s.event_type == event_type)
            .map(|s| (s.name.clone(), Arc::clone(&s.callback)))
            .collect();

        for (name, callback) in targets {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(payload)))
                .unwrap_or_else(|p| Err(format!("panicked: {}", panic_message(&*p))));
            if let Err(message) = outcome {
                match self.policy {
                    DeliveryPolicy::Isolate => {
                        log::error!(
                            "Subscriber '{}' failed on '{}': {}",
                            name,
                            event_type,
                            message
                        );
                    }
                    DeliveryPolicy::Propagate => {
                        return Err(PublishError {
                            subscriber: name,
                            event_type: event_type.to_string(),
                            message,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `(name, event_type)` pairs in subscription order.
    pub fn get_subscribers(&self) -> Vec<(String, String)> {
        self.lock_subscribers()
            .iter()
            .map(|s| (s.name.clone(), s.event_type.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(
        log: Arc<Mutex<Vec<String>>>,
        tag: &'static str,
    ) -> impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static {
        move |payload| {
            log.lock().unwrap().push(format!("{}:{}", tag, payload));
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_subscribe_is_ignored() {
        let bus = PubSub::create(DeliveryPolicy::Isolate);
        let calls = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(Subscriber::new("s", "e", recorder(calls.clone(), "first")));
        bus.subscribe(Subscriber::new("s", "e", recorder(calls.clone(), "second")));
        assert_eq!(bus.get_subscribers().len(), 1);

        bus.publish("e", &json!({"x": 1})).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![r#"first:{"x":1}"#.to_string()]);
    }

    #[test]
    fn test_publish_runs_in_subscription_order() {
        let bus = PubSub::create(DeliveryPolicy::Isolate);
        let calls = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(Subscriber::new("a", "e", recorder(calls.clone(), "a")));
        bus.subscribe(Subscriber::new("b", "other", recorder(calls.clone(), "b")));
        bus.subscribe(Subscriber::new("c", "e", recorder(calls.clone(), "c")));

        bus.publish("e", &json!(7)).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["a:7".to_string(), "c:7".to_string()]);
    }

    #[test]
    fn test_unsubscribe_and_unsubscribe_all() {
        let bus = PubSub::create(DeliveryPolicy::Isolate);
        let hits = Arc::new(AtomicUsize::new(0));
        for event in ["created", "updated", "deleted"] {
            let hits = hits.clone();
            bus.subscribe(Subscriber::new("audit", event, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        bus.subscribe(Subscriber::new("mailer", "created", |_| Ok(())));

        bus.unsubscribe("audit", "updated");
        bus.unsubscribe("audit", "never-subscribed");
        assert_eq!(bus.get_subscribers().len(), 3);

        bus.unsubscribe_all("audit");
        assert_eq!(
            bus.get_subscribers(),
            vec![("mailer".to_string(), "created".to_string())]
        );

        for event in ["created", "updated", "deleted"] {
            bus.publish(event, &Value::Null).unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_event_type_is_ignored() {
        let bus = PubSub::create(DeliveryPolicy::Propagate);
        bus.subscribe(Subscriber::new("s", "", |_| Err("should not run".into())));
        assert!(bus.publish("", &Value::Null).is_ok());
    }

    #[test]
    fn test_isolate_keeps_delivering_after_failure() {
        let bus = PubSub::create(DeliveryPolicy::Isolate);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        bus.subscribe(Subscriber::new("broken", "e", |_| Err("boom".into())));
        bus.subscribe(Subscriber::new("ok", "e", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        assert!(bus.publish("e", &Value::Null).is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_the_rest() {
        let bus = PubSub::create(DeliveryPolicy::Isolate);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        bus.subscribe(Subscriber::new("bad", "e", |_| panic!("boom")));
        bus.subscribe(Subscriber::new("ok", "e", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        assert!(bus.publish("e", &Value::Null).is_ok());
        assert!(bus.publish("e", &Value::Null).is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_propagate_reports_panic_as_error() {
        let bus = PubSub::create(DeliveryPolicy::Propagate);
        bus.subscribe(Subscriber::new("bad", "e", |_| panic!("boom")));

        let err = bus.publish("e", &Value::Null).unwrap_err();
        assert_eq!(err.subscriber, "bad");
        assert_eq!(err.message, "panicked: boom");
    }

    #[test]
    fn test_propagate_stops_at_first_failure() {
        let bus = PubSub::create(DeliveryPolicy::Propagate);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        bus.subscribe(Subscriber::new("broken", "e", |_| Err("boom".into())));
        bus.subscribe(Subscriber::new("ok", "e", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let err = bus.publish("e", &Value::Null).unwrap_err();
        assert_eq!(err.subscriber, "broken");
        assert_eq!(err.message, "boom");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let bus = PubSub::create(DeliveryPolicy::Isolate);
        let inner = Arc::clone(&bus);
        bus.subscribe(Subscriber::new("once", "e", move |_| {
            inner.unsubscribe("once", "e");
            Ok(())
        }));

        bus.publish("e", &Value::Null).unwrap();
        assert!(bus.get_subscribers().is_empty());
    }
}
