//! Eager, order-dependent dependency container.
//!
//! `register` runs the factory immediately and stores the resulting instance, so
//! registration order is dependency order: a factory may only `get` identifiers
//! registered before it. Each identifier can be registered once per container.
//!
//! `init_container` wires the whole service in a fixed sequence:
//!
//! ```text
//! logger -> pub_sub -> task_processor -> session_storage -> database
//!        -> user_repository -> user_service -> user_controller -> app
//! ```

use crate::{
    app::App,
    config::ServerConfig,
    database::Database,
    error::ContainerError,
    logger::Logger,
    pubsub::{DeliveryPolicy, PubSub, Subscriber},
    repository::UserRepository,
    routes::{Controller, UserController},
    service::{UserService, USER_CREATED, USER_DELETED, USER_UPDATED},
    session::SessionStorage,
    tasks::{TaskFailurePolicy, TaskProcessor},
};
use lazy_static::lazy_static;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Identifiers used by `init_container`.
pub mod services {
    pub const LOGGER: &str = "logger";
    pub const PUB_SUB: &str = "pub_sub";
    pub const TASK_PROCESSOR: &str = "task_processor";
    pub const SESSION_STORAGE: &str = "session_storage";
    pub const DATABASE: &str = "database";
    pub const USER_REPOSITORY: &str = "user_repository";
    pub const USER_SERVICE: &str = "user_service";
    pub const USER_CONTROLLER: &str = "user_controller";
    pub const APP: &str = "app";
}

/// Name of the bus subscriber that logs every user event.
pub const AUDIT_SUBSCRIBER: &str = "audit-log";

struct Registration {
    instance: Arc<dyn Any + Send + Sync>,
}

pub struct Container {
    config: ServerConfig,
    registrations: HashMap<String, Registration>,
    order: Vec<String>,
}

impl Container {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registrations: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Builds the instance for `id` with `factory` and stores it.
    ///
    /// Fails without invoking `factory` if `id` is already registered.
    pub fn register<T, F>(&mut self, id: &str, factory: F) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&Container) -> Result<Arc<T>, ContainerError>,
    {
        if self.registrations.contains_key(id) {
            return Err(ContainerError::DuplicateRegistration(id.to_string()));
        }
        let instance: Arc<dyn Any + Send + Sync> = factory(&*self)?;
        log::debug!("Registered service '{}'", id);
        self.registrations
            .insert(id.to_string(), Registration { instance });
        self.order.push(id.to_string());
        Ok(())
    }

    /// Returns the instance stored under `id`.
    pub fn get<T>(&self, id: &str) -> Result<Arc<T>, ContainerError>
    where
        T: Send + Sync + 'static,
    {
        let registration = self
            .registrations
            .get(id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        Arc::clone(&registration.instance)
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                id: id.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registrations.contains_key(id)
    }

    /// Registered identifiers in registration order.
    pub fn service_ids(&self) -> &[String] {
        &self.order
    }

    /// Registers every service of the application in dependency order.
    pub fn init_container(&mut self) -> Result<(), ContainerError> {
        use services::*;

        self.register(LOGGER, |c| Ok(Logger::create(&c.config().logging)))?;
        self.register(PUB_SUB, |_| Ok(PubSub::create(DeliveryPolicy::Isolate)))?;
        self.register(TASK_PROCESSOR, |c| {
            Ok(TaskProcessor::create(
                c.config().tasks.interval(),
                TaskFailurePolicy::LogAndContinue,
            ))
        })?;
        self.register(SESSION_STORAGE, |_| Ok(SessionStorage::create()))?;

        self.register(DATABASE, |c| {
            Database::create(&c.config().database).map_err(|e| ContainerError::Factory {
                id: DATABASE.to_string(),
                message: e.to_string(),
            })
        })?;

        self.register(USER_REPOSITORY, |c| {
            Ok(Arc::new(UserRepository::new(c.get::<Database>(DATABASE)?)))
        })?;
        self.register(USER_SERVICE, |c| {
            Ok(Arc::new(UserService::new(
                c.get::<UserRepository>(USER_REPOSITORY)?,
                c.get::<PubSub>(PUB_SUB)?,
                c.get::<TaskProcessor>(TASK_PROCESSOR)?,
                c.get::<SessionStorage>(SESSION_STORAGE)?,
            )))
        })?;
        self.register(USER_CONTROLLER, |c| {
            Ok(Arc::new(UserController::new(c.get::<UserService>(USER_SERVICE)?)))
        })?;

        self.register(APP, |c| {
            let users: Arc<dyn Controller> = c.get::<UserController>(USER_CONTROLLER)?;
            Ok(Arc::new(App::new(
                c.config().clone(),
                c.get::<Logger>(LOGGER)?,
                c.get::<Database>(DATABASE)?,
                c.get::<TaskProcessor>(TASK_PROCESSOR)?,
                vec![users],
            )))
        })?;

        let pub_sub = self.get::<PubSub>(PUB_SUB)?;
        for event in [USER_CREATED, USER_UPDATED, USER_DELETED] {
            pub_sub.subscribe(Subscriber::new(AUDIT_SUBSCRIBER, event, move |payload| {
                log::info!("{} {}", event, payload);
                Ok(())
            }));
        }

        Ok(())
    }
}

lazy_static! {
    static ref CONTAINER: RwLock<Option<Arc<Container>>> = RwLock::new(None);
}

/// Publishes `container` as the process-wide container. Fails if one is already installed.
pub fn install_container(container: Container) -> Result<Arc<Container>, ContainerError> {
    let mut slot = CONTAINER.write().unwrap_or_else(|p| p.into_inner());
    if slot.is_some() {
        return Err(ContainerError::DuplicateRegistration("container".to_string()));
    }
    let container = Arc::new(container);
    *slot = Some(Arc::clone(&container));
    Ok(container)
}

/// The process-wide container installed by the entrypoint.
pub fn get_container() -> Result<Arc<Container>, ContainerError> {
    CONTAINER
        .read()
        .unwrap_or_else(|p| p.into_inner())
        .clone()
        .ok_or_else(|| ContainerError::NotFound("container".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    struct Foo(&'static str);
    struct Bar(Arc<Foo>);

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.database.filename = ":memory:".into();
        config.logging.console = false;
        config
    }

    #[test]
    fn test_duplicate_registration_keeps_first_instance() {
        let mut container = Container::new(test_config());
        container.register("foo", |_| Ok(Arc::new(Foo("f1")))).unwrap();

        let second_ran = Cell::new(false);
        let err = container
            .register("foo", |_| {
                second_ran.set(true);
                Ok(Arc::new(Foo("f2")))
            })
            .unwrap_err();

        assert!(matches!(err, ContainerError::DuplicateRegistration(id) if id == "foo"));
        assert!(!second_ran.get());
        assert_eq!(container.get::<Foo>("foo").unwrap().0, "f1");
    }

    #[test]
    fn test_get_unknown_and_wrong_type() {
        let mut container = Container::new(test_config());
        assert!(matches!(
            container.get::<Foo>("foo"),
            Err(ContainerError::NotFound(_))
        ));

        container.register("foo", |_| Ok(Arc::new(Foo("f")))).unwrap();
        assert!(matches!(
            container.get::<Bar>("foo"),
            Err(ContainerError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_registration_order_is_dependency_order() {
        let mut container = Container::new(test_config());

        let err = container
            .register("bar", |c| Ok(Arc::new(Bar(c.get::<Foo>("foo")?))))
            .unwrap_err();
        assert!(matches!(err, ContainerError::NotFound(id) if id == "foo"));
        assert!(!container.contains("bar"));

        container.register("foo", |_| Ok(Arc::new(Foo("f")))).unwrap();
        container
            .register("bar", |c| Ok(Arc::new(Bar(c.get::<Foo>("foo")?))))
            .unwrap();
        let bar = container.get::<Bar>("bar").unwrap();
        assert!(Arc::ptr_eq(&bar.0, &container.get::<Foo>("foo").unwrap()));
    }

    #[test]
    fn test_init_container_wires_everything() {
        let mut container = Container::new(test_config());
        container.init_container().unwrap();

        assert_eq!(
            container.service_ids(),
            &[
                services::LOGGER,
                services::PUB_SUB,
                services::TASK_PROCESSOR,
                services::SESSION_STORAGE,
                services::DATABASE,
                services::USER_REPOSITORY,
                services::USER_SERVICE,
                services::USER_CONTROLLER,
                services::APP,
            ]
        );
        assert_eq!(
            container.get::<PubSub>(services::PUB_SUB).unwrap().get_subscribers().len(),
            3
        );

        let err = container.init_container().unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateRegistration(id) if id == services::LOGGER));
    }

    #[test]
    fn test_init_container_rejects_unknown_driver() {
        let mut config = test_config();
        config.database.driver = "mysql".into();
        let mut container = Container::new(config);

        let err = container.init_container().unwrap_err();
        assert!(matches!(err, ContainerError::Factory { id, .. } if id == services::DATABASE));
        assert!(!container.contains(services::USER_REPOSITORY));
    }
}
