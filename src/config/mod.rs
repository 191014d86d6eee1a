//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `INTENT_ENGINE_` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use intent_engine::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Ops server on {}:{}", config.server.host, config.server.port);
//! ```

mod advisory;
mod database;
mod error;
mod queue;
mod redis;
mod server;
mod watchdog;
mod worker;

pub use advisory::AdvisorySettings;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use queue::{QueueBackend, QueueConfig};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};
pub use watchdog::WatchdogConfig;
pub use worker::WorkerConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults except the store connections, which are only
/// required for the backend that is selected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Ops HTTP server (host, port, environment, log filter)
    #[serde(default)]
    pub server: ServerConfig,

    /// Queue backend selection and key namespace
    #[serde(default)]
    pub queue: QueueConfig,

    /// Required when `queue.backend = redis`
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// Required when `queue.backend = postgres`
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub advisory: AdvisorySettings,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `INTENT_ENGINE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `INTENT_ENGINE__WORKER__POOL_SIZE=8` -> `worker.pool_size = 8`
    /// - `INTENT_ENGINE__REDIS__URL=...` -> `redis.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("INTENT_ENGINE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid, or if
    /// the selected backend has no connection settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.queue.validate()?;
        self.worker.validate()?;
        self.watchdog.validate()?;
        self.advisory.validate()?;

        match self.queue.backend {
            QueueBackend::Redis => self
                .redis
                .as_ref()
                .ok_or(ValidationError::MissingRequired("INTENT_ENGINE__REDIS__URL"))?
                .validate()?,
            QueueBackend::Postgres => self
                .database
                .as_ref()
                .ok_or(ValidationError::MissingRequired("INTENT_ENGINE__DATABASE__URL"))?
                .validate()?,
            QueueBackend::Memory => {}
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
