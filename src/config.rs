use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Error raised when an environment variable holds a value that cannot be parsed.
#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => {
                write!(f, "Invalid value '{}' for {}", value, var)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub host: String,
    /// Port 0 lets the OS pick a free port.
    pub port: u16,
    pub cors_config: CorsConfig,
    /// When set, every route except `/health` requires `Authorization: Bearer <token>`.
    pub api_token: Option<String>,
    pub rate_limit: RateLimitConfig,
    /// Abort `App::start()` when the database branch fails.
    pub fail_on_database_error: bool,
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "userhub".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_config: CorsConfig::default(),
            api_token: None,
            rate_limit: RateLimitConfig::default(),
            fail_on_database_error: true,
            workers: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origin_allow_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite file, or `:memory:`.
    pub filename: String,
    pub driver: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            filename: "userhub.sqlite".to_string(),
            driver: "sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub console: bool,
    /// Log every HTTP request through actix's `Logger` middleware.
    pub http: bool,
    pub file: bool,
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            http: true,
            file: false,
            file_path: "userhub.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Delay between two task-queue steps, in milliseconds.
    pub timeout: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self { timeout: 1000 }
    }
}

impl TasksConfig {
    /// Never shorter than one millisecond, so an idle queue does not spin.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.timeout.max(1))
    }
}

impl ServerConfig {
    /// Builds the configuration from environment variables, falling back to defaults.
    ///
    /// Call `dotenv::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();

        let app = AppConfig {
            name: env::var("APP_NAME").unwrap_or(defaults.app.name),
            host: env::var("APP_HOST").unwrap_or(defaults.app.host),
            port: parse_var("APP_PORT", defaults.app.port)?,
            cors_config: CorsConfig {
                origin_allow_list: env::var("CORS_ORIGINS")
                    .map(|origins| split_list(&origins))
                    .unwrap_or(defaults.app.cors_config.origin_allow_list),
            },
            api_token: env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),
            rate_limit: RateLimitConfig {
                max_requests: parse_var("RATE_LIMIT_MAX", defaults.app.rate_limit.max_requests)?,
                window_secs: parse_var(
                    "RATE_LIMIT_WINDOW_SECS",
                    defaults.app.rate_limit.window_secs,
                )?,
            },
            fail_on_database_error: parse_var(
                "FAIL_ON_DATABASE_ERROR",
                defaults.app.fail_on_database_error,
            )?,
            workers: parse_var("APP_WORKERS", defaults.app.workers)?,
        };

        let database = DatabaseConfig {
            filename: env::var("DATABASE_FILENAME").unwrap_or(defaults.database.filename),
            driver: env::var("DATABASE_DRIVER").unwrap_or(defaults.database.driver),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or(defaults.logging.level),
            console: parse_var("LOG_CONSOLE", defaults.logging.console)?,
            http: parse_var("LOG_HTTP", defaults.logging.http)?,
            file: parse_var("LOG_FILE", defaults.logging.file)?,
            file_path: env::var("LOG_FILE_PATH").unwrap_or(defaults.logging.file_path),
        };

        let timeout = parse_var("TASKS_TIMEOUT_MS", defaults.tasks.timeout)?;
        if timeout == 0 {
            return Err(ConfigError::Invalid {
                var: "TASKS_TIMEOUT_MS",
                value: timeout.to_string(),
            });
        }
        let tasks = TasksConfig { timeout };

        Ok(Self {
            app,
            database,
            logging,
            tasks,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.app.host, self.app.port)
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
