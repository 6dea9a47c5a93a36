//! Scheduled network speed measurements.
//!
//! [`SpeedTestService`] ties a [`Scheduler`] to a persisted
//! [`SchedulerConfig`]. The config is re-read on every tick, so disabling it
//! from another process stops the timer at the next tick.

pub mod history;
pub mod runner;

pub use history::{MAX_HISTORY, SpeedTestHistory, SpeedTestHistoryEntry};
pub use runner::{SpeedTestResult, SpeedTestRunner};

use crate::{
    scheduler::{ScheduledTask, Scheduler, TaskError, TaskResult},
    settings::{ConfigStore, SchedulerConfig, SettingsResult, UpdateLock},
    shell::ShellRunner,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Scheduled speedtest run
pub struct SpeedTestTask {
    runner: SpeedTestRunner,
    history: Arc<SpeedTestHistory>,
    config: Arc<dyn ConfigStore>,
}

#[async_trait]
impl ScheduledTask for SpeedTestTask {
    fn name(&self) -> &str {
        "speedtest"
    }

    async fn is_enabled(&self) -> bool {
        match self.config.get().await {
            Ok(config) => config.enabled,
            Err(e) => {
                // Keep the current state on a transient read failure.
                log::warn!("Could not read speedtest config, keeping scheduler running: {}", e);
                true
            }
        }
    }

    async fn run(&self) -> TaskResult<()> {
        let result = self.runner.run().await;
        self.history.add(&result).await;

        if result.success {
            log::info!(
                "Speedtest: ping {:?} ms, down {:?} Mbit/s, up {:?} Mbit/s",
                result.ping,
                result.download,
                result.upload
            );
            Ok(())
        } else {
            Err(TaskError::Failed(
                result.message.unwrap_or_else(|| "speedtest failed".to_string()),
            ))
        }
    }
}

/// Snapshot of the speedtest scheduler
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTestStatus {
    pub enabled: bool,
    pub interval: u64,
    pub scheduler_running: bool,
    pub test_in_progress: bool,
    pub skipped_ticks: u64,
    pub history_entries: usize,
}

/// Speedtest scheduler, history and config
pub struct SpeedTestService {
    scheduler: Scheduler,
    task: Arc<SpeedTestTask>,
    config: Arc<dyn ConfigStore>,
    update_lock: UpdateLock,
}

impl SpeedTestService {
    /// Create the service; the scheduler stays stopped until started
    ///
    /// # Arguments
    ///
    /// * `shell` - Runs the speedtest and ping commands
    /// * `config` - Persisted enable flag and interval
    pub fn new(shell: Arc<dyn ShellRunner>, config: Arc<dyn ConfigStore>) -> Self {
        let task = Arc::new(SpeedTestTask {
            runner: SpeedTestRunner::new(shell),
            history: Arc::new(SpeedTestHistory::new()),
            config: config.clone(),
        });

        Self {
            scheduler: Scheduler::new("speedtest"),
            task,
            config,
            update_lock: UpdateLock::new(),
        }
    }

    /// Start the scheduler if the stored config enables it
    pub async fn start_from_config(&self) -> SettingsResult<SchedulerConfig> {
        let config = self.config.get().await?;
        self.apply(&config);
        if !config.enabled {
            log::info!("Speedtest scheduler disabled in config");
        }
        Ok(config)
    }

    pub async fn config(&self) -> SettingsResult<SchedulerConfig> {
        self.config.get().await
    }

    /// Change the enable flag and/or interval, persist, then reschedule
    ///
    /// # Errors
    ///
    /// * `SettingsError::UpdateInProgress` - Another change is being applied
    /// * `SettingsError::InvalidInterval` - Interval is zero
    pub async fn update_config(
        &self,
        enabled: Option<bool>,
        interval: Option<u64>,
    ) -> SettingsResult<SchedulerConfig> {
        let _guard = self.update_lock.try_acquire()?;

        let mut config = self.config.get().await?;
        if let Some(enabled) = enabled {
            config.enabled = enabled;
        }
        if let Some(interval) = interval {
            config.interval = interval;
        }
        config.validate()?;

        self.config.set(&config).await?;
        self.apply(&config);
        log::info!(
            "Speedtest config updated: enabled={}, interval={}s",
            config.enabled,
            config.interval
        );
        Ok(config)
    }

    /// Enable or disable, keeping the interval
    pub async fn toggle(&self, enabled: bool) -> SettingsResult<SchedulerConfig> {
        self.update_config(Some(enabled), None).await
    }

    fn apply(&self, config: &SchedulerConfig) {
        if !config.enabled {
            self.scheduler.stop();
            return;
        }

        let interval = config.interval_duration();
        if self.scheduler.interval() != Some(interval) {
            self.scheduler.start(self.task.clone(), interval);
        }
    }

    /// Run a measurement now and record it
    ///
    /// # Errors
    ///
    /// * `TaskError::AlreadyRunning` - A scheduled or manual run is in progress
    pub async fn run_now(&self) -> TaskResult<SpeedTestResult> {
        let _guard = self.scheduler.try_begin().ok_or(TaskError::AlreadyRunning)?;

        let result = self.task.runner.run().await;
        self.task.history.add(&result).await;
        Ok(result)
    }

    pub async fn history(&self) -> Vec<SpeedTestHistoryEntry> {
        self.task.history.list().await
    }

    pub async fn clear_history(&self) {
        self.task.history.clear().await;
    }

    pub fn is_test_running(&self) -> bool {
        self.scheduler.is_tick_in_progress()
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub async fn status(&self) -> SettingsResult<SpeedTestStatus> {
        let config = self.config.get().await?;
        Ok(SpeedTestStatus {
            enabled: config.enabled,
            interval: config.interval,
            scheduler_running: self.scheduler.is_running(),
            test_in_progress: self.scheduler.is_tick_in_progress(),
            skipped_ticks: self.scheduler.skipped_ticks(),
            history_entries: self.task.history.len().await,
        })
    }

    /// Stop the timer; an in-flight run completes
    pub fn stop(&self) {
        self.scheduler.stop();
    }
}
