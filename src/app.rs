//! Application lifecycle.
//!
//! `App::start()` runs in two phases. First the database branch (connect, then
//! schema setup) and the listener branch (bind the TCP socket) run concurrently.
//! Once both have settled, the middleware chain and every controller's routes are
//! installed on the bound listener and the server starts accepting connections.
//! `App::stop()` shuts the server and the database down concurrently.
//!
//! ```text
//! Created -> Starting -> Running -> Stopping -> Stopped
//!                 \-> Failed
//! ```
//!
//! A stopped (or failed) application cannot be started again.

use crate::{
    config::ServerConfig,
    database::Database,
    error::{AppError, DatabaseError, LifecycleError},
    logger::Logger,
    middleware::{self, BearerAuth, RateLimit, RateLimiter},
    routes::{self, health::ServiceInfo, Controller},
    tasks::TaskProcessor,
};
use actix_cors::Cors;
use actix_web::{
    dev::ServerHandle,
    http::header,
    middleware::{Condition, Logger as RequestLogger},
    rt, web, HttpServer,
};
use chrono::Utc;
use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard};

const JSON_BODY_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AppState::Created => "created",
            AppState::Starting => "starting",
            AppState::Running => "running",
            AppState::Stopping => "stopping",
            AppState::Stopped => "stopped",
            AppState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of each startup branch.
///
/// `database` may hold an error when `app.fail_on_database_error` is disabled;
/// the server is then running against an unavailable store.
#[derive(Debug)]
pub struct StartupReport {
    pub database: Result<(), DatabaseError>,
    pub server: Result<SocketAddr, LifecycleError>,
}

impl StartupReport {
    pub fn is_degraded(&self) -> bool {
        self.database.is_err() || self.server.is_err()
    }
}

/// Outcome of each shutdown branch. Failures are logged, never raised.
#[derive(Debug)]
pub struct ShutdownReport {
    pub server: Result<(), LifecycleError>,
    pub database: Result<(), DatabaseError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.server.is_ok() && self.database.is_ok()
    }
}

struct RunningServer {
    handle: ServerHandle,
    task: rt::task::JoinHandle<io::Result<()>>,
}

struct Runtime {
    state: AppState,
    server: Option<RunningServer>,
    local_addr: Option<SocketAddr>,
}

pub struct App {
    config: ServerConfig,
    logger: Arc<Logger>,
    database: Arc<Database>,
    tasks: Arc<TaskProcessor>,
    controllers: Vec<Arc<dyn Controller>>,
    rate_limiter: Arc<RateLimiter>,
    runtime: Mutex<Runtime>,
}

impl App {
    pub fn new(
        config: ServerConfig,
        logger: Arc<Logger>,
        database: Arc<Database>,
        tasks: Arc<TaskProcessor>,
        controllers: Vec<Arc<dyn Controller>>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(&config.app.rate_limit);
        Self {
            config,
            logger,
            database,
            tasks,
            controllers,
            rate_limiter,
            runtime: Mutex::new(Runtime {
                state: AppState::Created,
                server: None,
                local_addr: None,
            }),
        }
    }

    pub fn state(&self) -> AppState {
        self.runtime().state
    }

    /// Address the server is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.runtime().local_addr
    }

    /// Brings the database and the HTTP server up.
    ///
    /// A bind failure always aborts startup. A database failure aborts startup
    /// when `app.fail_on_database_error` is set, otherwise it is logged and
    /// reported in the returned `StartupReport`.
    pub async fn start(&self) -> Result<StartupReport, LifecycleError> {
        self.transition("start", AppState::Created, AppState::Starting)?;
        log::info!("Starting {}", self.config.app.name);

        let (database, listener) =
            futures::future::join(self.start_database(), self.bind_listener()).await;

        if let Err(e) = &database {
            log::error!("Database startup failed: {}", e);
        }
        let listener = match listener {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("Server startup failed: {}", e);
                let database = database.err().map(|e| e.to_string());
                return Err(self.abort_start(format!("server: {}{}", e, describe(database))).await);
            }
        };

        if let Err(e) = &database {
            if self.config.app.fail_on_database_error {
                drop(listener);
                return Err(self.abort_start(format!("database: {}", e)).await);
            }
            log::warn!("Continuing without a working database");
        }

        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => return Err(self.abort_start(format!("server: {}", e)).await),
        };
        let server = match self.serve(listener) {
            Ok(server) => server,
            Err(e) => return Err(self.abort_start(format!("server: {}", e)).await),
        };
        self.tasks.start();

        {
            let mut runtime = self.runtime();
            runtime.state = AppState::Running;
            runtime.server = Some(server);
            runtime.local_addr = Some(local_addr);
        }
        log::info!("{} listening on http://{}", self.config.app.name, local_addr);

        Ok(StartupReport {
            database,
            server: Ok(local_addr),
        })
    }

    /// Stops the task processor, then closes the server and the database concurrently.
    pub async fn stop(&self) -> Result<ShutdownReport, LifecycleError> {
        self.transition("stop", AppState::Running, AppState::Stopping)?;
        log::info!("Stopping {}", self.config.app.name);

        let server = self.runtime().server.take();
        self.tasks.stop();

        let (server, database) =
            futures::future::join(stop_server(server), self.database.close()).await;
        if let Err(e) = &server {
            log::error!("Server shutdown failed: {}", e);
        }
        if let Err(e) = &database {
            log::error!("Database shutdown failed: {}", e);
        }

        self.runtime().state = AppState::Stopped;
        log::info!("{} stopped", self.config.app.name);
        Ok(ShutdownReport { server, database })
    }

    async fn start_database(&self) -> Result<(), DatabaseError> {
        self.database.connect().await?;
        self.database.setup().await
    }

    async fn bind_listener(&self) -> Result<TcpListener, LifecycleError> {
        let addr = format!("{}:{}", self.config.app.host, self.config.app.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        Ok(listener.into_std()?)
    }

    /// Installs middleware and routes on the bound listener and spawns the server.
    fn serve(&self, listener: TcpListener) -> Result<RunningServer, LifecycleError> {
        let controllers = self.controllers.clone();
        let origins = self.config.app.cors_config.origin_allow_list.clone();
        let limiter = Arc::clone(&self.rate_limiter);
        let bearer = BearerAuth::new(self.config.app.api_token.as_deref());
        let http_logging = self.logger.http_enabled();
        let info = web::Data::new(ServiceInfo {
            name: self.config.app.name.clone(),
            started_at: Utc::now(),
        });

        for controller in &self.controllers {
            log::debug!("Registering routes for controller '{}'", controller.name());
        }

        // The last `wrap` sees the request first.
        let server = HttpServer::new(move || {
            let controllers = controllers.clone();
            actix_web::App::new()
                .app_data(info.clone())
                .app_data(json_config())
                .wrap(bearer.clone())
                .wrap(middleware::security_headers())
                .wrap(cors(&origins))
                .wrap(RateLimit::new(Arc::clone(&limiter)))
                .wrap(Condition::new(http_logging, RequestLogger::default()))
                .configure(move |cfg| routes::config(cfg, &controllers))
        })
        .workers(self.config.app.workers.max(1))
        .disable_signals()
        .listen(listener)?
        .run();

        let handle = server.handle();
        let task = rt::spawn(server);
        Ok(RunningServer { handle, task })
    }

    /// Rolls back a partial start and marks the application as failed.
    async fn abort_start(&self, reason: String) -> LifecycleError {
        if let Err(e) = self.database.close().await {
            log::error!("Database cleanup after failed start failed: {}", e);
        }
        self.runtime().state = AppState::Failed;
        LifecycleError::Startup(reason)
    }

    fn transition(
        &self,
        operation: &'static str,
        from: AppState,
        to: AppState,
    ) -> Result<(), LifecycleError> {
        let mut runtime = self.runtime();
        if runtime.state == from {
            runtime.state = to;
            return Ok(());
        }
        if operation == "start" && matches!(runtime.state, AppState::Stopped | AppState::Failed) {
            return Err(LifecycleError::NotRestartable);
        }
        Err(LifecycleError::InvalidState {
            operation,
            state: runtime.state.to_string(),
        })
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(|p| p.into_inner())
    }
}

async fn stop_server(server: Option<RunningServer>) -> Result<(), LifecycleError> {
    let Some(server) = server else {
        return Ok(());
    };
    server.handle.stop(true).await;
    match server.task.await {
        Ok(result) => result.map_err(LifecycleError::from),
        Err(e) => Err(LifecycleError::Shutdown(e.to_string())),
    }
}

fn describe(database_error: Option<String>) -> String {
    database_error
        .map(|e| format!("; database: {}", e))
        .unwrap_or_default()
}

fn cors(origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(3600);
    for origin in origins {
        if origin == "*" {
            cors = cors.allow_any_origin();
        } else {
            cors = cors.allowed_origin(origin);
        }
    }
    cors
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_BODY_LIMIT)
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}
