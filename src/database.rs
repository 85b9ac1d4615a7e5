//! SQLite adapter.
//!
//! `Database` owns the connection pool and exposes the small lifecycle the rest
//! of the service relies on: `connect()`, `setup()`, `close()` and `get_instance()`.

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

const MEMORY_FILENAME: &str = ":memory:";

const CREATE_USERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    pool: RwLock<Option<SqlitePool>>,
}

impl Database {
    /// Creates an unconnected adapter. Fails if the configured driver is not `sqlite`.
    pub fn create(config: &DatabaseConfig) -> Result<Arc<Database>, DatabaseError> {
        if !config.driver.eq_ignore_ascii_case("sqlite") {
            return Err(DatabaseError::UnsupportedDriver(config.driver.clone()));
        }
        Ok(Arc::new(Database {
            config: config.clone(),
            pool: RwLock::new(None),
        }))
    }

    /// Opens the pool. Connecting twice keeps the existing pool.
    pub async fn connect(&self) -> Result<(), DatabaseError> {
        if self.is_connected() {
            return Ok(());
        }

        let pool = if self.config.filename == MEMORY_FILENAME {
            // Every in-memory connection is its own database, so keep exactly one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            let options = SqliteConnectOptions::new()
                .filename(&self.config.filename)
                .create_if_missing(true)
                .foreign_keys(true);
            SqlitePoolOptions::new().connect_with(options).await?
        };

        log::info!("Connected to sqlite database {}", self.config.filename);
        *self.pool.write().unwrap_or_else(|p| p.into_inner()) = Some(pool);
        Ok(())
    }

    /// Enables foreign keys and creates the schema. Requires `connect()`.
    pub async fn setup(&self) -> Result<(), DatabaseError> {
        let pool = self.get_instance()?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        sqlx::query(CREATE_USERS_TABLE).execute(&pool).await?;
        log::info!("Database schema is ready");
        Ok(())
    }

    /// Closes the pool. Closing an unconnected database is a no-op.
    pub async fn close(&self) -> Result<(), DatabaseError> {
        let pool = self.pool.write().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(pool) = pool {
            pool.close().await;
            log::info!("Database connection closed");
        }
        Ok(())
    }

    /// Returns a handle to the pool.
    pub fn get_instance(&self) -> Result<SqlitePool, DatabaseError> {
        self.pool
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or(DatabaseError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.pool
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            filename: MEMORY_FILENAME.to_string(),
            driver: "sqlite".to_string(),
        }
    }

    #[test]
    fn test_unsupported_driver() {
        let config = DatabaseConfig {
            driver: "postgres".to_string(),
            ..memory_config()
        };
        assert!(matches!(
            Database::create(&config),
            Err(DatabaseError::UnsupportedDriver(driver)) if driver == "postgres"
        ));
    }

    #[actix_rt::test]
    async fn test_lifecycle() {
        let db = Database::create(&memory_config()).unwrap();
        assert!(matches!(db.get_instance(), Err(DatabaseError::NotConnected)));
        assert!(matches!(db.setup().await, Err(DatabaseError::NotConnected)));

        db.connect().await.unwrap();
        db.setup().await.unwrap();

        let pool = db.get_instance().unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        db.close().await.unwrap();
        db.close().await.unwrap();
        assert!(!db.is_connected());
    }
}
