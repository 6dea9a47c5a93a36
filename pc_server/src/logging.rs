//! Structured logging.
//!
//! Output goes to stderr so operator commands keep stdout for their own
//! results. The library crate logs through the `log` facade; installing the
//! subscriber here also bridges those records into tracing. Every event that
//! passes the filter is also kept in a [`LogBuffer`] for the dashboard.

use crate::log_capture::LogBuffer;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Line format selected by `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines with source locations
    #[default]
    Pretty,
    /// One JSON object per line, for journald or log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Install the global subscriber and return the buffer it captures into.
///
/// ```no_run
/// let logs = pc_server::logging::init();
/// tracing::info!("Server starting");
/// assert!(!logs.is_empty());
/// ```
pub fn init() -> LogBuffer {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let requested = std::env::var("LOG_FORMAT").unwrap_or_default();
    let (format, unknown) = match requested.parse::<LogFormat>() {
        Ok(format) => (format, None),
        Err(e) => (LogFormat::default(), Some(e)),
    };

    let json = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(false)
    });
    let pretty = (format == LogFormat::Pretty).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
    });

    let buffer = LogBuffer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(buffer.layer())
        .init();

    if let Some(e) = unknown {
        tracing::warn!("{}, using pretty output", e);
    }
    buffer
}

/// Security-relevant event (failed login, account or lifecycle changes) at WARN
///
/// ```
/// use pc_server::logging::log_security_event;
///
/// log_security_event("failed_login", None, "Invalid credentials for pi@example.com");
/// ```
pub fn log_security_event(event_type: &str, user_id: Option<&str>, message: &str) {
    tracing::warn!(event_type, user_id, "SECURITY: {}", message);
}

/// Routine account event (login, logout) at INFO
pub fn log_account_event(event_type: &str, user_id: &str, message: &str) {
    tracing::info!(event_type, user_id, "{}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" JSON ".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_events_without_subscriber() {
        log_security_event("failed_login", None, "Invalid credentials");
        log_security_event("user_deleted", Some("user_1"), "Deleted user_2");
        log_account_event("login", "user_1", "Session started");
    }
}
