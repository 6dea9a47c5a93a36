//! HTTP server and operator CLI for the Pi cockpit dashboard.
//!
//! - [`api`]: Router, cookie authentication and handlers
//! - [`cli`]: Operator subcommands sharing the server's database and config
//! - [`config`]: Environment-driven server configuration
//! - [`logging`]: Tracing subscriber setup and security event helpers
//! - [`log_capture`]: In-memory ring buffer of recent log lines
//! - [`metrics`]: Prometheus exporter and metric helpers

pub mod api;
pub mod cli;
pub mod config;
pub mod log_capture;
pub mod logging;
pub mod metrics;
