//! # Keystone Configuration
//!
//! Settings for the transactional core and the side-effect worker.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KEYSTONE_DATABASE_PATH=/var/lib/keystone/keystone.db               │
//! │     KEYSTONE_MAX_ATTEMPTS=5                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/erp/keystone.toml (Linux)                                │
//! │     ~/Library/Application Support/com.keystone.erp/keystone.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # keystone.toml
//! [database]
//! path = "keystone.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [numbering]
//! auto_provision = true
//!
//! [side_effects]
//! poll_interval_secs = 5
//! batch_size = 50
//! max_attempts = 10
//! initial_backoff_ms = 500
//! max_backoff_secs = 60
//!
//! [loyalty]
//! default_points_per_currency = 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use keystone_core::DEFAULT_POINTS_PER_CURRENCY;
use keystone_db::DbConfig;

use crate::error::ConfigError;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the SQLite write lock.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("keystone.db")
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Numbering Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberingSettings {
    /// Create a default sequence row the first time a known document type
    /// is numbered.
    #[serde(default = "default_true")]
    pub auto_provision: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NumberingSettings {
    fn default() -> Self {
        NumberingSettings {
            auto_provision: true,
        }
    }
}

// =============================================================================
// Side-Effect Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideEffectSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Attempts before an entry is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_batch_size() -> u32 {
    50
}
fn default_max_attempts() -> u32 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for SideEffectSettings {
    fn default() -> Self {
        SideEffectSettings {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl SideEffectSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Loyalty Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltySettings {
    /// Used for companies without a `loyalty_settings` row.
    #[serde(default = "default_points_per_currency")]
    pub default_points_per_currency: i64,
}

fn default_points_per_currency() -> i64 {
    DEFAULT_POINTS_PER_CURRENCY
}

impl Default for LoyaltySettings {
    fn default() -> Self {
        LoyaltySettings {
            default_points_per_currency: default_points_per_currency(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Keystone configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeystoneConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub numbering: NumberingSettings,

    #[serde(default)]
    pub side_effects: SideEffectSettings,

    #[serde(default)]
    pub loyalty: LoyaltySettings,
}

impl KeystoneConfig {
    /// Loads configuration: defaults, then the TOML file (explicit path or
    /// the platform default), then `KEYSTONE_*` variables.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading keystone config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but falls back to defaults on any error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be at least 1".into()));
        }
        if self.side_effects.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("side_effects.poll_interval_secs must be at least 1".into()));
        }
        if self.side_effects.batch_size == 0 {
            return Err(ConfigError::Invalid("side_effects.batch_size must be at least 1".into()));
        }
        if self.side_effects.max_attempts == 0 {
            return Err(ConfigError::Invalid("side_effects.max_attempts must be at least 1".into()));
        }
        if self.side_effects.initial_backoff() > self.side_effects.max_backoff() {
            return Err(ConfigError::Invalid(
                "side_effects.initial_backoff_ms exceeds max_backoff_secs".into(),
            ));
        }
        if self.loyalty.default_points_per_currency < 0 {
            return Err(ConfigError::Invalid("loyalty.default_points_per_currency must not be negative".into()));
        }
        Ok(())
    }

    /// Pool settings for [`keystone_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("KEYSTONE_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(n) = var("KEYSTONE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.database.max_connections = n;
        }

        if let Some(ms) = var("KEYSTONE_BUSY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.database.busy_timeout_ms = ms;
        }

        if let Some(flag) = var("KEYSTONE_AUTO_PROVISION") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.numbering.auto_provision = true,
                "0" | "false" | "no" => self.numbering.auto_provision = false,
                _ => warn!(value = %flag, "Unknown KEYSTONE_AUTO_PROVISION value"),
            }
        }

        if let Some(secs) = var("KEYSTONE_POLL_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.side_effects.poll_interval_secs = secs;
        }

        if let Some(n) = var("KEYSTONE_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.side_effects.batch_size = n;
        }

        if let Some(n) = var("KEYSTONE_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            debug!(max_attempts = n, "Overriding max attempts from environment");
            self.side_effects.max_attempts = n;
        }

        if let Some(points) = var("KEYSTONE_POINTS_PER_CURRENCY").and_then(|v| v.parse().ok()) {
            self.loyalty.default_points_per_currency = points;
        }
    }

    /// `keystone.toml` in the platform config directory.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "keystone", "erp").map(|dirs| dirs.config_dir().join("keystone.toml"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
