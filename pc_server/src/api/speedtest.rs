//! Speedtest runs, history and scheduler control.

use axum::{Form, Json, extract::State};
use pi_cockpit::speedtest::{SpeedTestHistoryEntry, SpeedTestResult, SpeedTestStatus};
use serde::{Deserialize, Serialize};

use super::{
    AppState, auth::MessageResponse, error::ApiError, error::ApiResult, parse_flag,
};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct IntervalForm {
    pub interval: Option<String>,
    pub enabled: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleForm {
    pub enabled: String,
}

#[derive(Debug, Serialize)]
pub struct IntervalResponse {
    pub success: bool,
    pub interval: u64,
    pub enabled: bool,
}

/// Run a measurement now.
///
/// # Errors
///
/// - `409 Conflict`: A scheduled or manual run is already in progress
pub async fn run(State(state): State<AppState>) -> ApiResult<Json<SpeedTestResult>> {
    let result = state.speedtest.run_now().await?;
    metrics::speedtest_run(&result);
    Ok(Json(result))
}

pub async fn history(State(state): State<AppState>) -> Json<Vec<SpeedTestHistoryEntry>> {
    Json(state.speedtest.history().await)
}

pub async fn clear_history(State(state): State<AppState>) -> Json<MessageResponse> {
    state.speedtest.clear_history().await;
    MessageResponse::ok("History cleared")
}

pub async fn get_interval(State(state): State<AppState>) -> ApiResult<Json<IntervalResponse>> {
    let config = state.speedtest.config().await?;
    Ok(Json(IntervalResponse {
        success: true,
        interval: config.interval,
        enabled: config.enabled,
    }))
}

/// Change the interval and/or enable flag.
///
/// # Errors
///
/// - `400 Bad Request`: Interval not a positive integer, or unreadable flag
/// - `409 Conflict`: Another change is being applied
pub async fn set_interval(
    State(state): State<AppState>,
    Form(form): Form<IntervalForm>,
) -> ApiResult<Json<IntervalResponse>> {
    let interval = form.interval.as_deref().map(parse_interval).transpose()?;
    let enabled = form.enabled.as_deref().map(required_flag).transpose()?;

    let config = state.speedtest.update_config(enabled, interval).await?;
    Ok(Json(IntervalResponse {
        success: true,
        interval: config.interval,
        enabled: config.enabled,
    }))
}

/// Enable or disable the scheduler, keeping the interval
pub async fn toggle(
    State(state): State<AppState>,
    Form(form): Form<ToggleForm>,
) -> ApiResult<Json<IntervalResponse>> {
    let config = state.speedtest.toggle(required_flag(&form.enabled)?).await?;
    Ok(Json(IntervalResponse {
        success: true,
        interval: config.interval,
        enabled: config.enabled,
    }))
}

pub async fn status(State(state): State<AppState>) -> ApiResult<Json<SpeedTestStatus>> {
    Ok(Json(state.speedtest.status().await?))
}

fn parse_interval(value: &str) -> Result<u64, ApiError> {
    match value.trim().parse::<i64>() {
        Ok(secs) if secs > 0 => Ok(secs as u64),
        _ => Err(ApiError::BadRequest(
            "Interval must be a positive number of seconds".to_string(),
        )),
    }
}

pub(super) fn required_flag(value: &str) -> Result<bool, ApiError> {
    parse_flag(value)
        .ok_or_else(|| ApiError::BadRequest("enabled must be true or false".to_string()))
}
