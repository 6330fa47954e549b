//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate
//! from an optional TOML file overlaid with `STINT__`-prefixed
//! environment variables. Each sub-module represents a logical
//! configuration section.

pub mod database;
pub mod logging;
pub mod worker;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Environment variable prefix used for configuration overrides.
pub const ENV_PREFIX: &str = "STINT";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Worker process settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file and the environment.
    ///
    /// The file is optional; environment variables such as
    /// `STINT__DATABASE__URL` or `STINT__WORKER__QUEUES=a,b` take precedence.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading configuration");

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("worker.queues")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Build a configuration for the given database URL with default
    /// worker and logging sections.
    pub fn for_database(url: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::new(url),
            worker: WorkerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.database.url.trim().is_empty() {
            return Err(AppError::configuration("database.url must not be empty"));
        }
        self.worker.validate()
    }
}
