//! Configuration loading and typed config structures for the dispatch engine.
//!
//! The canonical configuration lives in `dispatch-config.yaml` at the
//! project root. This module defines strongly-typed structs that mirror the
//! YAML structure, and provides a loader that reads and validates the file.

use std::path::Path;
use std::time::Duration;

use dispatch_types::{DepartmentId, ShouldDo, StatusId, StatusValue};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
///
/// Mirrors the structure of `dispatch-config.yaml`. All fields have
/// defaults suitable for local development with the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DispatchConfig {
    /// HTTP / WebSocket listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Broadcaster and mutation pipeline tuning.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Persistence backend.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Statuses loaded into an empty in-memory store at start-up.
    #[serde(default)]
    pub seed_statuses: Vec<SeedStatus>,
}

impl DispatchConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `DATABASE_URL` overrides `storage.postgres_url`
    /// - `DISPATCH_PORT` overrides `server.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("DATABASE_URL") {
            self.storage.postgres_url = Some(val);
        }
        if let Ok(val) = std::env::var("DISPATCH_PORT") {
            self.server.port = val.parse().map_err(|e| ConfigError::Invalid {
                field: "server.port",
                reason: format!("DISPATCH_PORT={val}: {e}"),
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.queue_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.sync.persist_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.persist_timeout_ms",
                reason: "must be at least 1".into(),
            });
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.postgres_url.is_none() {
            return Err(ConfigError::Invalid {
                field: "storage.postgres_url",
                reason: "required for the postgres backend (or set DATABASE_URL)".into(),
            });
        }
        Ok(())
    }

    /// The seed statuses as catalog entries.
    pub fn seed_catalog(&self) -> Vec<StatusValue> {
        self.seed_statuses.iter().map(SeedStatus::to_status).collect()
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Broadcaster and mutation pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Per-session outbound queue capacity. A session that falls this far
    /// behind is evicted and must resync.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long a mutation waits for the store before failing with a
    /// retryable error.
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
}

impl SyncConfig {
    /// [`Self::persist_timeout_ms`] as a [`Duration`].
    pub const fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            persist_timeout_ms: default_persist_timeout_ms(),
        }
    }
}

/// Which store backs the roster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local tables; state is lost on restart.
    #[default]
    Memory,
    /// `PostgreSQL` via `storage.postgres_url`.
    Postgres,
}

/// Persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StorageBackend,

    /// `PostgreSQL` connection string.
    #[serde(default)]
    pub postgres_url: Option<String>,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Run embedded migrations at start-up.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            postgres_url: None,
            max_connections: default_max_connections(),
            run_migrations: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// A status entry in the seed catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedStatus {
    /// Fixed id; a fresh one is generated when omitted.
    #[serde(default)]
    pub id: Option<StatusId>,
    /// Display label.
    pub value: String,
    /// Owning department.
    pub department_id: DepartmentId,
    /// Effect of selecting this status.
    pub should_do: ShouldDo,
    /// Position within the department.
    pub position: u32,
    /// Display color.
    #[serde(default)]
    pub color: Option<String>,
}

impl SeedStatus {
    fn to_status(&self) -> StatusValue {
        StatusValue {
            id: self.id.unwrap_or_default(),
            value: self.value.clone(),
            department_id: self.department_id,
            should_do: self.should_do,
            position: self.position,
            color: self.color.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

const fn default_queue_capacity() -> usize {
    256
}

const fn default_persist_timeout_ms() -> u64 {
    5_000
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sync.queue_capacity, 256);
        assert_eq!(config.sync.persist_timeout(), Duration::from_secs(5));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r##"
server:
  host: "127.0.0.1"
  port: 9000

sync:
  queue_capacity: 32
  persist_timeout_ms: 750

storage:
  backend: memory

logging:
  level: debug
  format: json

seed_statuses:
  - value: "10-8"
    department_id: "0192f0c4-7d1e-7c3a-9a55-3c1f1e0a0001"
    should_do: SET_ON_DUTY
    position: 0
  - value: "10-7"
    department_id: "0192f0c4-7d1e-7c3a-9a55-3c1f1e0a0001"
    should_do: SET_OFF_DUTY
    position: 1
    color: "#888"
"##;
        let config = DispatchConfig::parse(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.sync.queue_capacity, 32);
        assert_eq!(config.sync.persist_timeout(), Duration::from_millis(750));
        assert_eq!(config.logging.format, LogFormat::Json);

        let catalog = config.seed_catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.first().unwrap().should_do, ShouldDo::SetOnDuty);
        assert_eq!(catalog.get(1).unwrap().color.as_deref(), Some("#888"));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = DispatchConfig::parse("logging:\n  level: warn\n").unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let err = DispatchConfig::parse("sync:\n  queue_capacity: 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "sync.queue_capacity",
                ..
            }
        ));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let err = DispatchConfig::parse("server: [not, a, map]").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }
}
