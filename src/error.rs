//!
//! # Custom Error Handling
//!
//! This module defines the error types used throughout the service.
//!
//! `AppError` is the HTTP-facing error: it implements `actix_web::error::ResponseError`
//! so handlers can return it directly and have it rendered as a JSON body with the
//! matching status code. The remaining enums belong to the service core:
//! `ContainerError` for the dependency container, `DatabaseError` for the SQLite
//! adapter and `LifecycleError` for application start/stop.
//!
//! `From` implementations for `sqlx::Error`, `validator::ValidationErrors`,
//! `serde_json::Error` and `DatabaseError` let handlers and services use `?` freely.

use actix_web::{error::ResponseError, HttpResponse};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// Represents all errors that can be reported to an HTTP client.
///
/// Each variant carries a message and maps onto one status code.
#[derive(Debug)]
pub enum AppError {
    /// Missing or invalid bearer token (HTTP 401).
    Unauthorized(String),
    /// Malformed request, e.g. a body that is not valid JSON (HTTP 400).
    BadRequest(String),
    /// The requested resource does not exist (HTTP 404).
    NotFound(String),
    /// The request collides with existing state, e.g. a duplicate email (HTTP 409).
    Conflict(String),
    /// The client exceeded the configured request rate (HTTP 429).
    TooManyRequests(String),
    /// Unexpected server-side failure (HTTP 500).
    InternalServerError(String),
    /// Failure reported by the database layer (HTTP 500).
    DatabaseError(String),
    /// DTO validation failed (HTTP 422 Unprocessable Entity).
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::TooManyRequests(msg) => write!(f, "Too Many Requests: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts `AppError` variants into JSON `HttpResponse` objects.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Unauthorized(msg) => HttpResponse::Unauthorized().json(json!({
                "error": msg
            })),
            AppError::BadRequest(msg) => HttpResponse::BadRequest().json(json!({
                "error": msg
            })),
            AppError::NotFound(msg) => HttpResponse::NotFound().json(json!({
                "error": msg
            })),
            AppError::Conflict(msg) => HttpResponse::Conflict().json(json!({
                "error": msg
            })),
            AppError::TooManyRequests(msg) => HttpResponse::TooManyRequests().json(json!({
                "error": msg
            })),
            AppError::InternalServerError(msg) => HttpResponse::InternalServerError().json(json!({
                "error": msg
            })),
            // Driver messages are not leaked to clients.
            AppError::DatabaseError(_) => HttpResponse::InternalServerError().json(json!({
                "error": "Database error"
            })),
            AppError::ValidationError(msg) => HttpResponse::UnprocessableEntity().json(json!({
                "error": msg
            })),
        }
    }
}

/// `RowNotFound` becomes `NotFound`, unique constraint violations become `Conflict`,
/// everything else is a `DatabaseError`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Record already exists".into())
            }
            _ => AppError::DatabaseError(error.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> AppError {
        AppError::BadRequest(format!("Invalid JSON body: {}", error))
    }
}

impl From<DatabaseError> for AppError {
    fn from(error: DatabaseError) -> AppError {
        match error {
            DatabaseError::Sqlx(inner) => AppError::from(inner),
            other => AppError::DatabaseError(other.to_string()),
        }
    }
}

/// Errors raised by the dependency container.
///
/// All of them are fatal during `init_container()`.
#[derive(Debug)]
pub enum ContainerError {
    /// The identifier was already registered on this container.
    DuplicateRegistration(String),
    /// Nothing is registered under the identifier.
    NotFound(String),
    /// The identifier holds an instance of a different type.
    TypeMismatch { id: String, expected: &'static str },
    /// The factory for the identifier failed.
    Factory { id: String, message: String },
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContainerError::DuplicateRegistration(id) => {
                write!(f, "Service '{}' is already registered", id)
            }
            ContainerError::NotFound(id) => write!(f, "Service '{}' is not registered", id),
            ContainerError::TypeMismatch { id, expected } => {
                write!(f, "Service '{}' is not of type {}", id, expected)
            }
            ContainerError::Factory { id, message } => {
                write!(f, "Failed to build service '{}': {}", id, message)
            }
        }
    }
}

impl std::error::Error for ContainerError {}

/// Errors raised by the SQLite adapter.
#[derive(Debug)]
pub enum DatabaseError {
    /// Only the `sqlite` driver is supported.
    UnsupportedDriver(String),
    /// `get_instance()` was called before `connect()` or after `close()`.
    NotConnected,
    /// Error reported by `sqlx`.
    Sqlx(sqlx::Error),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DatabaseError::UnsupportedDriver(driver) => {
                write!(f, "Unsupported database driver: {}", driver)
            }
            DatabaseError::NotConnected => write!(f, "Database is not connected"),
            DatabaseError::Sqlx(e) => write!(f, "Database driver error: {}", e),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> DatabaseError {
        DatabaseError::Sqlx(error)
    }
}

/// Errors raised by `App::start()` and `App::stop()`.
#[derive(Debug)]
pub enum LifecycleError {
    /// The operation is not allowed from the current state.
    InvalidState { operation: &'static str, state: String },
    /// A stopped application cannot be started again.
    NotRestartable,
    /// Startup failed in a phase that is treated as a hard fault.
    Startup(String),
    /// Shutdown of one of the components failed.
    Shutdown(String),
    /// A database phase failed.
    Database(DatabaseError),
    /// Binding or serving on the socket failed.
    Io(std::io::Error),
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LifecycleError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while application is {}", operation, state)
            }
            LifecycleError::NotRestartable => {
                write!(f, "Application has been stopped and cannot be restarted")
            }
            LifecycleError::Startup(msg) => write!(f, "Startup failed: {}", msg),
            LifecycleError::Shutdown(msg) => write!(f, "Shutdown failed: {}", msg),
            LifecycleError::Database(e) => write!(f, "{}", e),
            LifecycleError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<DatabaseError> for LifecycleError {
    fn from(error: DatabaseError) -> LifecycleError {
        LifecycleError::Database(error)
    }
}

impl From<std::io::Error> for LifecycleError {
    fn from(error: std::io::Error) -> LifecycleError {
        LifecycleError::Io(error)
    }
}
