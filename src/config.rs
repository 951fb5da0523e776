//! Storage configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::db::{HEALTH_PROBE_PERIOD, SchemaNames};

/// Storage engine selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Embedded single-file engine.
    #[default]
    #[display("SQLite")]
    Sqlite,
}

/// Everything the storage layer needs from the host.
#[derive(Debug, Clone, PartialEq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_", into)]
#[serde(default)]
pub struct StorageConfig {
    /// Which engine to use.
    backend: Backend,

    /// Host data directory holding the database file.
    data_dir: PathBuf,

    /// Starting balance of a new account; accounts still at this amount are
    /// pruned by `clean` when their player is offline.
    default_balance: f64,

    /// Seconds between health-probe ticks.
    health_probe_secs: u64,

    /// Table and column names.
    schema: SchemaNames,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: PathBuf::from("."),
            default_balance: 0.0,
            health_probe_secs: HEALTH_PROBE_PERIOD.as_secs(),
            schema: SchemaNames::default(),
        }
    }
}

impl StorageConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if a
    /// configured table or column name is unusable.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(backend = %config.backend, data_dir = %config.data_dir.display(), "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML, a zero probe interval, or
    /// invalid schema names.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        if config.health_probe_secs == 0 {
            return Err(ConfigError::new(
                "health_probe_secs must be at least 1".to_string(),
            ));
        }
        config
            .schema
            .validate()
            .map_err(|e| ConfigError::new(e.message))?;
        Ok(config)
    }

    /// Health-probe interval as a [`Duration`], never shorter than a second.
    pub fn health_probe_period(&self) -> Duration {
        Duration::from_secs(self.health_probe_secs.max(1))
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
