//! Prometheus metrics for the dashboard server.
//!
//! The exporter is installed only when `METRICS_BIND` is set. Without an
//! installed recorder every helper here is a no-op, so handlers call them
//! unconditionally.
//!
//! ```rust,no_run
//! use pc_server::metrics;
//! use std::{net::SocketAddr, time::Duration};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let addr: SocketAddr = "127.0.0.1:9090".parse()?;
//! metrics::init_metrics(addr)?;
//!
//! metrics::http_request("POST", "/api/login", 200, Duration::from_millis(40));
//! metrics::active_sessions(3);
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use pi_cockpit::{admin::AdminAction, speedtest::SpeedTestResult};
use std::{net::SocketAddr, time::Duration};

/// Install the Prometheus exporter; metrics are served at `http://<addr>/metrics`
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("cockpit_http_requests_total", "HTTP requests by route and status");
    describe_histogram!(
        "cockpit_http_request_duration_seconds",
        "HTTP request latency by route"
    );
    describe_counter!("cockpit_login_attempts_total", "Logins by outcome");
    describe_gauge!("cockpit_active_sessions", "Sessions in the registry");
    describe_counter!("cockpit_admin_actions_total", "Restart, shutdown and update requests");
    describe_counter!("cockpit_speedtest_runs_total", "Manual speed tests by outcome");
    describe_gauge!("cockpit_speedtest_download_mbps", "Last manual download measurement");
    describe_gauge!("cockpit_speedtest_upload_mbps", "Last manual upload measurement");
    describe_gauge!("cockpit_speedtest_ping_ms", "Last manual ping measurement");
    Ok(())
}

/// Count a served request. `route` is the matched route template.
pub fn http_request(method: &str, route: &str, status: u16, elapsed: Duration) {
    counter!("cockpit_http_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("cockpit_http_request_duration_seconds", "route" => route.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn login_attempt(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("cockpit_login_attempts_total", "outcome" => outcome).increment(1);
}

pub fn active_sessions(count: usize) {
    gauge!("cockpit_active_sessions").set(count as f64);
}

pub fn admin_action(action: AdminAction) {
    counter!("cockpit_admin_actions_total", "action" => action.as_str()).increment(1);
}

/// Record a manual speed test. Gauges keep the last measured values; a
/// degraded ping-only result leaves the bandwidth gauges untouched.
pub fn speedtest_run(result: &SpeedTestResult) {
    let outcome = if result.success { "success" } else { "failure" };
    counter!("cockpit_speedtest_runs_total", "outcome" => outcome).increment(1);

    if let Some(download) = result.download {
        gauge!("cockpit_speedtest_download_mbps").set(download);
    }
    if let Some(upload) = result.upload {
        gauge!("cockpit_speedtest_upload_mbps").set(upload);
    }
    if let Some(ping) = result.ping {
        gauge!("cockpit_speedtest_ping_ms").set(ping);
    }
}
