//! Periodic check for upstream commits, followed by update-and-restart.

use crate::{
    admin::AdminControl,
    scheduler::{ScheduledTask, Scheduler, TaskError, TaskResult},
    settings::{SettingsResult, SettingsStore},
    shell::ShellRunner,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

/// Default time between update checks
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Counts commits between the checkout and `origin/main`
#[derive(Clone)]
pub struct UpdateChecker {
    shell: Arc<dyn ShellRunner>,
}

impl UpdateChecker {
    pub fn new(shell: Arc<dyn ShellRunner>) -> Self {
        Self { shell }
    }

    /// Fetch `origin/main` and count differing commits
    pub async fn commits_behind(&self) -> TaskResult<u32> {
        self.shell
            .exec("git", &["fetch", "origin", "main"], GIT_TIMEOUT)
            .await?;
        let output = self
            .shell
            .exec(
                "git",
                &["rev-list", "HEAD...origin/main", "--count"],
                GIT_TIMEOUT,
            )
            .await?;

        output.stdout.trim().parse().map_err(|_| {
            TaskError::Failed(format!(
                "unexpected rev-list output '{}'",
                output.stdout.trim()
            ))
        })
    }
}

/// Scheduled update check
pub struct AutoUpdateTask {
    checker: UpdateChecker,
    settings: SettingsStore,
    admin: AdminControl,
}

impl AutoUpdateTask {
    pub fn new(checker: UpdateChecker, settings: SettingsStore, admin: AdminControl) -> Self {
        Self {
            checker,
            settings,
            admin,
        }
    }
}

#[async_trait]
impl ScheduledTask for AutoUpdateTask {
    fn name(&self) -> &str {
        "auto-update"
    }

    async fn is_enabled(&self) -> bool {
        match self.settings.get().await {
            Ok(settings) => settings.auto_update,
            Err(e) => {
                log::error!("Could not read auto-update setting, treating as off: {}", e);
                false
            }
        }
    }

    async fn run(&self) -> TaskResult<()> {
        let behind = self.checker.commits_behind().await?;
        if behind == 0 {
            log::info!("Auto-update: already up to date");
            return Ok(());
        }

        log::warn!(
            "Auto-update: {} commit(s) available, updating and restarting",
            behind
        );
        self.admin.update_and_restart();
        Ok(())
    }
}

/// Auto-update scheduler bound to the `autoUpdate` setting
pub struct AutoUpdateService {
    scheduler: Scheduler,
    task: Arc<AutoUpdateTask>,
    settings: SettingsStore,
    interval: Duration,
}

impl AutoUpdateService {
    pub fn new(task: AutoUpdateTask, settings: SettingsStore, interval: Duration) -> Self {
        Self {
            scheduler: Scheduler::new("auto-update"),
            task: Arc::new(task),
            settings,
            interval,
        }
    }

    /// Start checking if auto-update is enabled
    ///
    /// # Returns
    ///
    /// * `SettingsResult<bool>` - Whether the scheduler was started
    pub async fn start_from_settings(&self) -> SettingsResult<bool> {
        let enabled = self.settings.get().await?.auto_update;
        if enabled {
            self.scheduler.start(self.task.clone(), self.interval);
        } else {
            log::info!("Auto-update disabled in settings");
        }
        Ok(enabled)
    }

    /// Persist the setting and start or stop checking
    pub async fn set_enabled(&self, enabled: bool) -> SettingsResult<()> {
        self.settings.set_auto_update(enabled).await?;
        if enabled {
            if !self.scheduler.is_running() {
                self.scheduler.start(self.task.clone(), self.interval);
            }
        } else {
            self.scheduler.stop();
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }
}
