//! Persisted settings: the speedtest scheduler config and system settings.

pub mod config_store;
pub mod system;

pub use config_store::{
    ConfigStore, JsonFileConfigStore, MemoryConfigStore, SchedulerConfig, UpdateGuard, UpdateLock,
};
pub use system::{SettingsStore, SystemSettings};

use thiserror::Error;

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Config file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON
    #[error("Malformed config: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Another config change is being applied
    #[error("Update already in progress")]
    UpdateInProgress,

    /// Interval must be a positive number of seconds
    #[error("Invalid interval: {0}")]
    InvalidInterval(u64),
}

/// Result type for settings operations
pub type SettingsResult<T> = Result<T, SettingsError>;
