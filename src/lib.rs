#![doc = "The `userhub` library crate."]
#![doc = ""]
#![doc = "A users CRUD service built from a small set of lifecycle-managed components:"]
#![doc = "an eager dependency container, an interval-driven task queue, an in-process"]
#![doc = "pub/sub bus, scratch session storage and an `App` that brings the SQLite"]
#![doc = "database and the actix-web server up and down. `main.rs` wires them together"]
#![doc = "through `Container::init_container`."]

pub mod app;
pub mod config;
pub mod container;
pub mod database;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod pubsub;
pub mod repository;
pub mod routes;
pub mod security;
pub mod service;
pub mod session;
pub mod tasks;

pub use app::{App, AppState, ShutdownReport, StartupReport};
pub use config::ServerConfig;
pub use container::{get_container, install_container, services, Container};
pub use error::{AppError, ContainerError, DatabaseError, LifecycleError};
