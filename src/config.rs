//! Configuration system for certsync.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `CERTSYNC_SERVER_HOST` - Server bind address
//! - `CERTSYNC_SERVER_PORT` - Server port
//! - `CERTSYNC_DATA_DIR` - Directory for the encrypted local store
//! - `CERTSYNC_DATABASE_TYPE` - "sqlite" or "postgres"
//! - `CERTSYNC_DATABASE_URL` - Database connection URL
//! - `CERTSYNC_POLL_INTERVAL_MS` - Fallback poller interval
//! - `CERTSYNC_FRESHNESS_WINDOW_MS` - Max age of an actionable fallback record
//! - `CERTSYNC_ADMIN_PASSWORD_SHA256` - Hex SHA-256 of the admin password
//! - `CERTSYNC_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;

use crate::errors::{SyncError, SyncResult};

/// Root configuration structure.
///
/// Constructed once at startup and passed down explicitly; there is no
/// process-global configuration singleton.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CertsyncConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Cross-context synchronization timings
    pub sync: SyncTimingConfig,
    /// Encrypted local store configuration
    pub storage: StorageConfig,
    /// Remote gateway database configuration
    pub database: DatabaseConfig,
    /// Admin session configuration
    pub session: SessionConfig,
    /// Admin credential configuration
    pub admin: AdminConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Timings for the broadcast transport and its fallback poller.
///
/// The freshness window must exceed the poll interval with margin, otherwise
/// a durable record can expire before any poller tick observes it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncTimingConfig {
    /// Capacity of the broadcast channel
    pub channel_capacity: usize,
    /// Poller tick interval in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum age of a durable fallback record still considered actionable
    pub freshness_window_ms: u64,
    /// Gateway snapshot refresh interval in milliseconds (0 disables)
    pub refresh_interval_ms: u64,
}

impl Default for SyncTimingConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            poll_interval_ms: 3_000,
            freshness_window_ms: 5_000,
            refresh_interval_ms: 0,
        }
    }
}

/// Encrypted local store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the encrypted entity blobs, backups and key file
    pub data_dir: String,
    /// Number of backup generations retained per key
    pub backup_generations: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "certsync_data".to_string(),
            backup_generations: 5,
        }
    }
}

/// Database configuration for the remote gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://certsync.db".to_string(),
            postgres_url: "postgres://localhost/certsync".to_string(),
        }
    }
}

/// Admin session configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity timeout in seconds before a session expires
    pub idle_timeout_secs: u64,
    /// How often the session monitor revalidates, in seconds
    pub check_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            check_interval_secs: 60,
        }
    }
}

/// Admin credential configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Hex-encoded SHA-256 of the admin password (empty disables login)
    pub password_sha256: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

impl CertsyncConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> SyncResult<Self> {
        let builder = Config::builder()
            // Start with defaults
            .set_default("server.host", "127.0.0.1")
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("server.port", 8080)
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("sync.channel_capacity", 256)
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("sync.poll_interval_ms", 3_000)
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("sync.freshness_window_ms", 5_000)
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("sync.refresh_interval_ms", 0)
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("storage.data_dir", "certsync_data")
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("storage.backup_generations", 5)
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("database.db_type", "sqlite")
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("database.sqlite_url", "sqlite://certsync.db")
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("database.postgres_url", "postgres://localhost/certsync")
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("session.idle_timeout_secs", 1_800)
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("session.check_interval_secs", 60)
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("admin.password_sha256", "")
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("logging.enabled", true)
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_default("logging.level", "info")
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("CERTSYNC_SERVER_HOST").ok())
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_override_option(
                "server.port",
                env::var("CERTSYNC_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_override_option("storage.data_dir", env::var("CERTSYNC_DATA_DIR").ok())
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_override_option(
                "sync.poll_interval_ms",
                env::var("CERTSYNC_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_override_option(
                "sync.freshness_window_ms",
                env::var("CERTSYNC_FRESHNESS_WINDOW_MS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_override_option("database.db_type", env::var("CERTSYNC_DATABASE_TYPE").ok())
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.sqlite_url",
                env::var("CERTSYNC_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.postgres_url",
                env::var("CERTSYNC_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_override_option(
                "admin.password_sha256",
                env::var("CERTSYNC_ADMIN_PASSWORD_SHA256").ok(),
            )
            .map_err(|e| SyncError::ConfigError(e.to_string()))?
            .set_override_option("logging.level", env::var("CERTSYNC_LOG_LEVEL").ok())
            .map_err(|e| SyncError::ConfigError(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| SyncError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| SyncError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Load and validate, for callers that want a single entry point.
    pub fn init() -> SyncResult<Self> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.server.port == 0 {
            return Err(SyncError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(SyncError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.sync.poll_interval_ms == 0 {
            return Err(SyncError::ConfigError(
                "sync.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        // The window must be wider than the tick, otherwise records can
        // expire between polls and the backstop silently never fires.
        if self.sync.freshness_window_ms <= self.sync.poll_interval_ms {
            return Err(SyncError::ConfigError(format!(
                "sync.freshness_window_ms ({}) must exceed sync.poll_interval_ms ({})",
                self.sync.freshness_window_ms, self.sync.poll_interval_ms
            )));
        }

        if self.storage.backup_generations == 0 {
            return Err(SyncError::ConfigError(
                "storage.backup_generations must be greater than 0".to_string(),
            ));
        }

        if self.session.idle_timeout_secs == 0 || self.session.check_interval_secs == 0 {
            return Err(SyncError::ConfigError(
                "session timeouts must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(SyncError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}
