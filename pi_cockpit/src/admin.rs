//! Restart, shutdown and update-and-restart.
//!
//! The process never exits inline: each action is scheduled after a short
//! grace delay so the HTTP response acknowledging it can be flushed first.
//! Exiting is delegated to a [`ProcessSupervisor`]; in production that is
//! [`ExitCodeSupervisor`], which exits with [`RESTART_EXIT_CODE`] to ask the
//! external launcher for a relaunch.

use crate::shell::{ShellRunner, split_command_line};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Exit status asking the launcher to start the server again
pub const RESTART_EXIT_CODE: i32 = 42;

/// Exit status for a plain stop
pub const SHUTDOWN_EXIT_CODE: i32 = 0;

/// Default delay before acting on an admin request
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Upper bound for the external update procedure
pub const UPDATE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Receives process lifecycle intents
pub trait ProcessSupervisor: Send + Sync {
    fn request_restart(&self);
    fn request_shutdown(&self);
}

/// Maps lifecycle intents onto process exit codes
#[derive(Debug, Default)]
pub struct ExitCodeSupervisor;

impl ProcessSupervisor for ExitCodeSupervisor {
    fn request_restart(&self) {
        log::warn!("Exiting with code {} for restart", RESTART_EXIT_CODE);
        std::process::exit(RESTART_EXIT_CODE);
    }

    fn request_shutdown(&self) {
        log::warn!("Exiting with code {} for shutdown", SHUTDOWN_EXIT_CODE);
        std::process::exit(SHUTDOWN_EXIT_CODE);
    }
}

/// Admin lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Restart,
    Shutdown,
    UpdateAndRestart,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::Restart => "restart",
            AdminAction::Shutdown => "shutdown",
            AdminAction::UpdateAndRestart => "update",
        }
    }
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schedules lifecycle actions
#[derive(Clone)]
pub struct AdminControl {
    supervisor: Arc<dyn ProcessSupervisor>,
    shell: Arc<dyn ShellRunner>,
    grace: Duration,
    update_command: String,
    pending: Arc<AtomicBool>,
}

impl AdminControl {
    /// Create admin control
    ///
    /// # Arguments
    ///
    /// * `supervisor` - Receives the final restart/shutdown intent
    /// * `shell` - Runs the update command
    /// * `grace` - Delay between the request and acting on it
    /// * `update_command` - Command line of the external update procedure
    pub fn new(
        supervisor: Arc<dyn ProcessSupervisor>,
        shell: Arc<dyn ShellRunner>,
        grace: Duration,
        update_command: impl Into<String>,
    ) -> Self {
        Self {
            supervisor,
            shell,
            grace,
            update_command: update_command.into(),
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether an action is already scheduled
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Schedule a restart
    ///
    /// # Returns
    ///
    /// * `bool` - `false` if another action was already scheduled
    pub fn restart(&self) -> bool {
        self.schedule(AdminAction::Restart)
    }

    /// Schedule a shutdown
    pub fn shutdown(&self) -> bool {
        self.schedule(AdminAction::Shutdown)
    }

    /// Run the update procedure, then restart
    ///
    /// The restart happens even if the update command fails, so the server
    /// comes back on whatever code is on disk.
    pub fn update_and_restart(&self) -> bool {
        self.schedule(AdminAction::UpdateAndRestart)
    }

    fn schedule(&self, action: AdminAction) -> bool {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Ignoring {} request: another action is pending", action);
            return false;
        }

        log::warn!("Admin {} scheduled in {:?}", action, self.grace);
        let control = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(control.grace).await;
            control.perform(action).await;
        });
        true
    }

    async fn perform(&self, action: AdminAction) {
        match action {
            AdminAction::Restart => self.supervisor.request_restart(),
            AdminAction::Shutdown => self.supervisor.request_shutdown(),
            AdminAction::UpdateAndRestart => {
                self.run_update().await;
                self.supervisor.request_restart();
            }
        }
    }

    async fn run_update(&self) {
        let Some((program, args)) = split_command_line(&self.update_command) else {
            log::error!("Update command is empty, restarting without update");
            return;
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        log::info!("Running update: {}", self.update_command);
        match self.shell.exec(&program, &args, UPDATE_TIMEOUT).await {
            Ok(output) => log::info!("Update finished: {}", output.stdout.trim()),
            Err(e) => log::error!("Update failed: {}", e),
        }
    }
}
