//! Speed measurement with fallbacks.
//!
//! Tries `speedtest --json`, then `speedtest --simple`, then a plain
//! `ping`. The ping fallback still counts as a successful measurement, with
//! no bandwidth figures.

use crate::{
    scheduler::{TaskError, TaskResult},
    shell::ShellRunner,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Time limit for one speedtest invocation
pub const SPEEDTEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Time limit for the ping fallback
pub const PING_TIMEOUT: Duration = Duration::from_secs(20);

const PING_HOST: &str = "8.8.8.8";
const UNIT: &str = "ms / Mbit/s";
const PING_ONLY_MESSAGE: &str =
    "Full speedtest not available. Only ping test completed. Install: sudo apt-get install speedtest-cli";
const FAILED_MESSAGE: &str =
    "Speed test failed. Install speedtest-cli: sudo apt-get install speedtest-cli";

/// Outcome of one measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    pub success: bool,
    /// Milliseconds
    pub ping: Option<f64>,
    /// Mbit/s
    pub download: Option<f64>,
    /// Mbit/s
    pub upload: Option<f64>,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SpeedTestResult {
    fn measured(ping: Option<f64>, download: Option<f64>, upload: Option<f64>) -> Self {
        Self {
            success: true,
            ping,
            download,
            upload,
            unit: UNIT.to_string(),
            message: None,
            timestamp: Utc::now(),
        }
    }

    fn failed() -> Self {
        Self {
            success: false,
            ping: None,
            download: None,
            upload: None,
            unit: UNIT.to_string(),
            message: Some(FAILED_MESSAGE.to_string()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonReport {
    ping: Option<f64>,
    /// bits per second
    download: Option<f64>,
    upload: Option<f64>,
}

/// Runs speed measurements through a [`ShellRunner`]
#[derive(Clone)]
pub struct SpeedTestRunner {
    shell: Arc<dyn ShellRunner>,
}

impl SpeedTestRunner {
    pub fn new(shell: Arc<dyn ShellRunner>) -> Self {
        Self { shell }
    }

    /// Measure, falling back through the available tools
    ///
    /// Never fails; when every method fails the result has `success == false`.
    pub async fn run(&self) -> SpeedTestResult {
        match self.run_json().await {
            Ok(result) => return result,
            Err(e) => log::warn!("speedtest --json failed, trying simple mode: {}", e),
        }

        match self.run_simple().await {
            Ok(result) => return result,
            Err(e) => log::warn!("speedtest --simple failed, falling back to ping: {}", e),
        }

        match self.run_ping().await {
            Ok(result) => result,
            Err(e) => {
                log::error!("All speedtest methods failed, last error: {}", e);
                SpeedTestResult::failed()
            }
        }
    }

    async fn run_json(&self) -> TaskResult<SpeedTestResult> {
        let output = self
            .shell
            .exec("speedtest", &["--json"], SPEEDTEST_TIMEOUT)
            .await?;
        parse_json_report(&output.stdout)
    }

    async fn run_simple(&self) -> TaskResult<SpeedTestResult> {
        let output = self
            .shell
            .exec("speedtest", &["--simple"], SPEEDTEST_TIMEOUT)
            .await?;
        Ok(parse_simple_report(&output.stdout))
    }

    async fn run_ping(&self) -> TaskResult<SpeedTestResult> {
        let output = self
            .shell
            .exec("ping", &["-c", "4", PING_HOST], PING_TIMEOUT)
            .await?;
        let average = parse_ping_average(&output.stdout)
            .ok_or_else(|| TaskError::Failed("could not parse ping output".to_string()))?;

        let mut result = SpeedTestResult::measured(Some(round2(average)), None, None);
        result.message = Some(PING_ONLY_MESSAGE.to_string());
        Ok(result)
    }
}

/// Parse `speedtest --json`; bandwidth arrives in bits/s
pub fn parse_json_report(stdout: &str) -> TaskResult<SpeedTestResult> {
    let report: JsonReport = serde_json::from_str(stdout)
        .map_err(|e| TaskError::Failed(format!("invalid speedtest JSON: {e}")))?;

    let to_mbit = |bits: f64| round2(bits / 1_000_000.0);
    Ok(SpeedTestResult::measured(
        report.ping.filter(|p| *p != 0.0),
        report.download.filter(|d| *d != 0.0).map(to_mbit),
        report.upload.filter(|u| *u != 0.0).map(to_mbit),
    ))
}

/// Parse `speedtest --simple` lines such as `Download: 93.21 Mbit/s`
pub fn parse_simple_report(stdout: &str) -> SpeedTestResult {
    let mut ping = None;
    let mut download = None;
    let mut upload = None;

    for line in stdout.lines() {
        let Some((label, rest)) = line.split_once(':') else {
            continue;
        };
        let value = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<f64>().ok());

        match label.trim() {
            "Ping" => ping = value,
            "Download" => download = value,
            "Upload" => upload = value,
            _ => {}
        }
    }

    SpeedTestResult::measured(ping, download, upload)
}

/// Average round-trip time from a `ping` summary line
///
/// Handles both `rtt min/avg/max/mdev = 9.1/10.2/11.3/0.4 ms` and
/// `round-trip min/avg/max/stddev = ...`.
pub fn parse_ping_average(stdout: &str) -> Option<f64> {
    let line = stdout.lines().find(|l| l.contains("min/avg/max"))?;
    let (_, values) = line.split_once('=')?;
    values.trim().split('/').nth(1)?.trim().parse().ok()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
