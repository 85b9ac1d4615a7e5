//! Logging backend setup.
//!
//! The crate logs through the `log` facade; `Logger::create` installs an
//! `env_logger` backend according to `LoggingConfig`. Installation is attempted
//! once per process; later calls reuse whatever backend is already in place.

use crate::config::LoggingConfig;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::Arc;

/// Handle to the configured logging backend.
#[derive(Debug)]
pub struct Logger {
    config: LoggingConfig,
    level: LevelFilter,
}

impl Logger {
    /// Configures and installs the global logger.
    ///
    /// File output wins over console output when both are enabled. With neither
    /// enabled the level is forced to `Off`. An unknown level name falls back to `Info`.
    pub fn create(config: &LoggingConfig) -> Arc<Logger> {
        let mut level = LevelFilter::from_str(&config.level).unwrap_or(LevelFilter::Info);

        let mut builder = Builder::new();
        if config.file {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.file_path)
            {
                Ok(file) => {
                    builder.target(Target::Pipe(Box::new(file)));
                }
                Err(e) => {
                    eprintln!("Cannot open log file {}: {}", config.file_path, e);
                    builder.target(Target::Stderr);
                }
            }
        } else if config.console {
            builder.target(Target::Stderr);
        } else {
            level = LevelFilter::Off;
        }
        builder.filter_level(level);

        if builder.try_init().is_err() {
            log::debug!("Logger already installed, keeping the existing backend");
        }

        Arc::new(Logger {
            config: config.clone(),
            level,
        })
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Whether HTTP request logging middleware should be installed.
    pub fn http_enabled(&self) -> bool {
        self.config.http
    }
}
