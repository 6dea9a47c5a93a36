//! Scheduler config persistence.

use super::{SettingsError, SettingsResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::RwLock;

/// Default speedtest interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Enable flag and interval of a recurring task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Seconds between runs
    pub interval: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl SchedulerConfig {
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Reject a zero interval
    pub fn validate(&self) -> SettingsResult<()> {
        if self.interval == 0 {
            return Err(SettingsError::InvalidInterval(self.interval));
        }
        Ok(())
    }
}

/// Storage for a [`SchedulerConfig`], re-read on every scheduler tick
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self) -> SettingsResult<SchedulerConfig>;
    async fn set(&self, config: &SchedulerConfig) -> SettingsResult<()>;
}

/// Config stored as a small JSON file
///
/// A missing file reads as the default config. Writes go to a sibling
/// temporary file that is then renamed over the original.
#[derive(Debug, Clone)]
pub struct JsonFileConfigStore {
    path: PathBuf,
}

impl JsonFileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    async fn get(&self) -> SettingsResult<SchedulerConfig> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(SchedulerConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, config: &SchedulerConfig) -> SettingsResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        log::debug!("Saved scheduler config to {}", self.path.display());
        Ok(())
    }
}

/// Config kept in memory
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: RwLock<SchedulerConfig>,
}

impl MemoryConfigStore {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self) -> SettingsResult<SchedulerConfig> {
        Ok(*self.config.read().await)
    }

    async fn set(&self, config: &SchedulerConfig) -> SettingsResult<()> {
        *self.config.write().await = *config;
        Ok(())
    }
}

/// Rejects concurrent config changes instead of queueing them
#[derive(Debug, Clone, Default)]
pub struct UpdateLock {
    busy: Arc<AtomicBool>,
}

/// Releases the [`UpdateLock`] on drop
#[derive(Debug)]
pub struct UpdateGuard {
    busy: Arc<AtomicBool>,
}

impl UpdateLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock
    ///
    /// # Errors
    ///
    /// * `SettingsError::UpdateInProgress` - The lock is held
    pub fn try_acquire(&self) -> SettingsResult<UpdateGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SettingsError::UpdateInProgress)?;
        Ok(UpdateGuard {
            busy: self.busy.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
