//! Onboard LED status and configuration.

use axum::{Extension, Json, extract::State};
use pi_cockpit::led::{LedConfig, LedConfigUpdate, LedStatus};
use serde::Serialize;

use super::{AppState, error::ApiResult, middleware::AuthUser};

#[derive(Debug, Serialize)]
pub struct LedConfigResponse {
    pub success: bool,
    pub config: LedConfig,
}

pub async fn status(State(state): State<AppState>) -> ApiResult<Json<LedStatus>> {
    Ok(Json(state.led.status().await?))
}

/// Apply a partial LED config.
///
/// # Errors
///
/// - `400 Bad Request`: Mode not selectable or not offered by the device
/// - `409 Conflict`: Another LED change is being applied
/// - `503 Service Unavailable`: The LED does not exist on this system
pub async fn update_config(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(update): Json<LedConfigUpdate>,
) -> ApiResult<Json<LedConfigResponse>> {
    tracing::info!(user_id = %user.user_id, ?update, "LED config change requested");
    let config = state.led.update(update).await?;
    Ok(Json(LedConfigResponse {
        success: true,
        config,
    }))
}
