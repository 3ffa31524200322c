//! # Terminal Configuration
//!
//! Configuration management for a stall terminal.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FESTIVE_OPERATOR=caja-1                                            │
//! │     FESTIVE_DB_PATH=/srv/festive/festive.db                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/terminal.toml (Linux)                                │
//! │     ~/Library/Application Support/com.festive.pos/terminal.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated terminal id, 15 s poll, "venta manual" marker       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # terminal.toml
//! [terminal]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Caja 1"
//! operator = "caja-1"
//!
//! [sync]
//! poll_interval_secs = 15
//! start_online = true
//!
//! [storage]
//! db_file = "festive.db"
//! error_log_capacity = 50
//!
//! [catalog]
//! manual_product_marker = "venta manual"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use festive_core::MANUAL_PRODUCT_MARKER;

/// File name of the offline queue document.
pub const OFFLINE_QUEUE_KEY: &str = "pos_offline_queue";

/// File name of the rolling error log document.
pub const ERROR_LOG_KEY: &str = "pos_error_logs";

// =============================================================================
// Terminal Identity
// =============================================================================

/// Who this terminal is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalIdentity {
    /// Unique terminal identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable name (e.g., "Caja 1").
    #[serde(default = "default_terminal_name")]
    pub name: String,

    /// Operator identity stamped as paid-by and closed-by.
    #[serde(default = "default_operator")]
    pub operator: String,
}

fn default_terminal_name() -> String {
    "Caja".to_string()
}

fn default_operator() -> String {
    "caja".to_string()
}

impl Default for TerminalIdentity {
    fn default() -> Self {
        TerminalIdentity {
            id: Uuid::new_v4().to_string(),
            name: default_terminal_name(),
            operator: default_operator(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// View refresh and connectivity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between safety-net view reloads (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Initial value of the connectivity signal.
    #[serde(default = "default_true")]
    pub start_online: bool,

    /// First delay between offline replay attempts (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the replay delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_poll_interval() -> u64 {
    15
}
fn default_true() -> bool {
    true
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            poll_interval_secs: default_poll_interval(),
            start_online: default_true(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where the terminal keeps its files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory for the database file and the durable documents.
    /// Defaults to the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Database file name inside `data_dir`.
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// Explicit database path; wins over `data_dir` + `db_file`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Entries kept in the rolling error log.
    #[serde(default = "default_error_log_capacity")]
    pub error_log_capacity: usize,
}

fn default_db_file() -> String {
    "festive.db".to_string()
}

fn default_error_log_capacity() -> usize {
    50
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            data_dir: None,
            db_file: default_db_file(),
            db_path: None,
            error_log_capacity: default_error_log_capacity(),
        }
    }
}

// =============================================================================
// Catalog Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Case-insensitive name fragment of the product manual lines are
    /// booked against.
    #[serde(default = "default_manual_marker")]
    pub manual_product_marker: String,
}

fn default_manual_marker() -> String {
    MANUAL_PRODUCT_MARKER.to_string()
}

impl Default for CatalogSettings {
    fn default() -> Self {
        CatalogSettings {
            manual_product_marker: default_manual_marker(),
        }
    }
}

// =============================================================================
// Main Terminal Configuration
// =============================================================================

/// Complete terminal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default)]
    pub terminal: TerminalIdentity,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,
}

impl TerminalConfig {
    /// Creates a new config with defaults and a generated terminal ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (terminal.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading terminal config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load terminal config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Terminal config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.terminal.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("terminal.id must not be empty".into()));
        }

        if self.terminal.operator.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "terminal.operator must not be empty".into(),
            ));
        }

        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.storage.error_log_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "error_log_capacity must be greater than 0".into(),
            ));
        }

        if self.catalog.manual_product_marker.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "manual_product_marker must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("FESTIVE_TERMINAL_ID") {
            debug!(terminal_id = %id, "Overriding terminal ID from environment");
            self.terminal.id = id;
        }

        if let Ok(operator) = std::env::var("FESTIVE_OPERATOR") {
            debug!(operator = %operator, "Overriding operator from environment");
            self.terminal.operator = operator;
        }

        if let Ok(dir) = std::env::var("FESTIVE_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }

        if let Ok(path) = std::env::var("FESTIVE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.db_path = Some(PathBuf::from(path));
        }

        if let Ok(secs) = std::env::var("FESTIVE_POLL_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.poll_interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid FESTIVE_POLL_INTERVAL_SECS"),
            }
        }

        if let Ok(marker) = std::env::var("FESTIVE_MANUAL_PRODUCT") {
            self.catalog.manual_product_marker = marker;
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "festive", "pos")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("terminal.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn terminal_id(&self) -> &str {
        &self.terminal.id
    }

    pub fn operator(&self) -> &str {
        &self.terminal.operator
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    pub fn manual_product_marker(&self) -> &str {
        &self.catalog.manual_product_marker
    }

    /// Directory for the database and the durable documents.
    ///
    /// Falls back to `./festive-data` when the platform has no data dir.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("festive-data"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join(&self.storage.db_file))
    }

    pub fn offline_queue_path(&self) -> PathBuf {
        self.data_dir().join(format!("{OFFLINE_QUEUE_KEY}.json"))
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.data_dir().join(format!("{ERROR_LOG_KEY}.json"))
    }
}
