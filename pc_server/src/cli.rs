//! Operator commands run against the shared database and config file.
//!
//! A running server notices a disable from here on its next scheduler tick.
//! Enabling takes effect at the next server start or through the HTTP API.

use anyhow::{Context, Result, bail};
use pi_cockpit::{
    Database, UserStore,
    settings::{ConfigStore, JsonFileConfigStore, SettingsStore},
};
use pico_args::Arguments;
use std::{fmt::Write as _, sync::Arc};

use crate::config::StorageConfig;

/// Subcommands understood besides `serve`
pub const COMMANDS: &[&str] = &["user", "requests", "speedtest", "autoupdate"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    UserAdd {
        email: String,
        password: String,
        name: String,
    },
    UserDelete {
        id: String,
    },
    UserPasswd {
        email: String,
        password: String,
    },
    UserList,
    RequestsList,
    RequestsApprove {
        id: String,
    },
    RequestsReject {
        id: String,
    },
    SpeedtestConfig {
        enabled: Option<bool>,
        interval: Option<u64>,
    },
    AutoUpdate(AutoUpdateAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoUpdateAction {
    On,
    Off,
    Status,
}

impl Command {
    /// Parse the words following a top-level subcommand
    ///
    /// # Errors
    ///
    /// Returns error for unknown actions or missing/invalid arguments
    pub fn parse(subcommand: &str, pargs: &mut Arguments) -> Result<Self> {
        let action = pargs.subcommand()?;
        let command = match (subcommand, action.as_deref()) {
            ("user", Some("add")) => Command::UserAdd {
                name: pargs.opt_value_from_str("--name")?.unwrap_or_default(),
                email: pargs.free_from_str().context("missing <email>")?,
                password: pargs.free_from_str().context("missing <password>")?,
            },
            ("user", Some("delete")) => Command::UserDelete {
                id: pargs.free_from_str().context("missing <id>")?,
            },
            ("user", Some("passwd")) => Command::UserPasswd {
                email: pargs.free_from_str().context("missing <email>")?,
                password: pargs.free_from_str().context("missing <password>")?,
            },
            ("user", Some("list")) => Command::UserList,
            ("requests", Some("list")) => Command::RequestsList,
            ("requests", Some("approve")) => Command::RequestsApprove {
                id: pargs.free_from_str().context("missing <id>")?,
            },
            ("requests", Some("reject")) => Command::RequestsReject {
                id: pargs.free_from_str().context("missing <id>")?,
            },
            ("speedtest", Some("config")) => Command::SpeedtestConfig {
                enabled: pargs.opt_value_from_str("--enabled")?,
                interval: pargs.opt_value_from_str("--interval")?,
            },
            ("autoupdate", Some("on")) => Command::AutoUpdate(AutoUpdateAction::On),
            ("autoupdate", Some("off")) => Command::AutoUpdate(AutoUpdateAction::Off),
            ("autoupdate", Some("status") | None) => {
                Command::AutoUpdate(AutoUpdateAction::Status)
            }
            (group, Some(action)) => bail!("unknown command: {} {}", group, action),
            (group, None) => bail!("missing action for '{}'", group),
        };
        Ok(command)
    }
}

/// Stores a command operates on
pub struct Cli {
    users: UserStore,
    settings: SettingsStore,
    speedtest_config: Arc<dyn ConfigStore>,
}

impl Cli {
    pub fn new(
        users: UserStore,
        settings: SettingsStore,
        speedtest_config: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            users,
            settings,
            speedtest_config,
        }
    }

    /// Open the database and config file named by the storage config
    pub async fn open(storage: &StorageConfig) -> Result<Self> {
        let db = Database::new(&storage.database)
            .await
            .with_context(|| format!("opening {}", storage.database.database_url))?;
        let pool = db.pool().clone();

        Ok(Self::new(
            UserStore::new(pool.clone(), storage.password_pepper.clone()),
            SettingsStore::new(pool).await?,
            Arc::new(JsonFileConfigStore::new(
                storage.scheduler_config_path.clone(),
            )),
        ))
    }

    /// Execute a command and return the text to print
    pub async fn run(&self, command: Command) -> Result<String> {
        let output = match command {
            Command::UserAdd {
                email,
                password,
                name,
            } => {
                let credential = self.users.create(&email, &password, &name).await?;
                format!("Created user {} ({})", credential.id, credential.email)
            }
            Command::UserDelete { id } => {
                self.users.delete(&id).await?;
                format!("Deleted user {}", id)
            }
            Command::UserPasswd { email, password } => {
                let id = self
                    .users
                    .id_of(&email)
                    .await?
                    .with_context(|| format!("no user with email {}", email))?;
                self.users.set_password(&id, &password).await?;
                format!("Password changed for {} ({})", email, id)
            }
            Command::UserList => {
                let users = self.users.list().await?;
                if users.is_empty() {
                    "No users".to_string()
                } else {
                    let mut out = String::new();
                    for user in users {
                        let _ = writeln!(out, "{}\t{}", user.id, user.email);
                    }
                    out.trim_end().to_string()
                }
            }
            Command::RequestsList => {
                let requests = self.users.pending_requests().await?;
                if requests.is_empty() {
                    "No pending requests".to_string()
                } else {
                    let mut out = String::new();
                    for request in requests {
                        let _ = writeln!(
                            out,
                            "{}\t{}\t{}\t{}",
                            request.id,
                            request.email,
                            request.name,
                            request.requested_at.to_rfc3339()
                        );
                    }
                    out.trim_end().to_string()
                }
            }
            Command::RequestsApprove { id } => {
                let credential = self.users.approve(&id).await?;
                format!("Approved {} as user {}", id, credential.id)
            }
            Command::RequestsReject { id } => {
                self.users.reject(&id).await?;
                format!("Rejected {}", id)
            }
            Command::SpeedtestConfig { enabled, interval } => {
                let mut config = self.speedtest_config.get().await?;
                if enabled.is_some() || interval.is_some() {
                    if let Some(enabled) = enabled {
                        config.enabled = enabled;
                    }
                    if let Some(interval) = interval {
                        config.interval = interval;
                    }
                    config.validate()?;
                    self.speedtest_config.set(&config).await?;
                }
                format!(
                    "Speedtest scheduler: enabled={}, interval={}s",
                    config.enabled, config.interval
                )
            }
            Command::AutoUpdate(action) => {
                match action {
                    AutoUpdateAction::On => self.settings.set_auto_update(true).await?,
                    AutoUpdateAction::Off => self.settings.set_auto_update(false).await?,
                    AutoUpdateAction::Status => {}
                }
                let settings = self.settings.get().await?;
                format!(
                    "Auto-update is {}",
                    if settings.auto_update { "on" } else { "off" }
                )
            }
        };
        Ok(output)
    }
}
