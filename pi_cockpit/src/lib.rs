//! # Pi Cockpit
//!
//! Core of a self-hosted admin dashboard for a single-board computer.
//!
//! The library owns everything stateful behind the HTTP layer: login tokens
//! and their verification cache, the session ledger, credential storage with
//! the access-request workflow, and the background schedulers that run speed
//! tests and check for updates.
//!
//! ## Core Modules
//!
//! - [`auth`]: Token service, session registry and user store
//! - [`scheduler`]: Interval runner with an overlap guard and self-stop
//! - [`admin`]: Restart, shutdown and update-and-restart with a grace delay
//! - [`speedtest`]: Scheduled measurements and bounded history
//! - [`update`]: Auto-update checks against the upstream branch
//! - [`settings`]: Scheduler config file and system settings table
//! - [`led`]: Onboard LED trigger selection
//!
//! ## Example
//!
//! ```no_run
//! use pi_cockpit::{
//!     settings::JsonFileConfigStore, shell::TokioShellRunner, speedtest::SpeedTestService,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = SpeedTestService::new(
//!         Arc::new(TokioShellRunner::new()),
//!         Arc::new(JsonFileConfigStore::new("config/speedtest.json")),
//!     );
//!     service.start_from_config().await?;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod auth;
pub mod db;
pub mod led;
pub mod scheduler;
pub mod scores;
pub mod settings;
pub mod shell;
pub mod speedtest;
pub mod sso;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

pub use admin::{AdminControl, ExitCodeSupervisor, ProcessSupervisor, RESTART_EXIT_CODE};
pub use auth::{AuthError, SessionRegistry, TokenService, UserStore};
pub use db::{Database, DatabaseConfig};
pub use scheduler::{ScheduledTask, Scheduler, TaskError};
pub use settings::SettingsError;
