//! System settings and lifecycle actions.
//!
//! Restart, shutdown and update always answer immediately; the action runs
//! after the grace delay so the response reaches the client first.

use axum::{Extension, Form, Json, extract::State};
use pi_cockpit::admin::AdminAction;
use serde::{Deserialize, Serialize};

use super::{
    AppState, auth::MessageResponse, error::ApiResult, middleware::AuthUser,
    speedtest::required_flag,
};
use crate::{logging::log_security_event, metrics};

#[derive(Debug, Deserialize)]
pub struct AutoUpdateForm {
    pub enabled: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub auto_update: bool,
    /// Whether the update checker is currently scheduled
    pub auto_update_running: bool,
    pub auto_update_interval_minutes: u64,
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<SettingsResponse>> {
    let settings = state.settings.get().await?;
    Ok(Json(SettingsResponse {
        auto_update: settings.auto_update,
        auto_update_running: state.auto_update.is_running(),
        auto_update_interval_minutes: state.auto_update.interval().as_secs() / 60,
    }))
}

/// Persist the auto-update flag and start or stop the checker
pub async fn set_auto_update(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Form(form): Form<AutoUpdateForm>,
) -> ApiResult<Json<SettingsResponse>> {
    let enabled = required_flag(&form.enabled)?;
    state.auto_update.set_enabled(enabled).await?;
    log_security_event(
        "auto_update_changed",
        Some(&actor.user_id),
        &format!("Auto-update set to {}", enabled),
    );
    get_settings(State(state)).await
}

pub async fn restart(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
) -> Json<MessageResponse> {
    schedule(&state, &actor, AdminAction::Restart)
}

pub async fn shutdown(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
) -> Json<MessageResponse> {
    schedule(&state, &actor, AdminAction::Shutdown)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
) -> Json<MessageResponse> {
    schedule(&state, &actor, AdminAction::UpdateAndRestart)
}

fn schedule(state: &AppState, actor: &AuthUser, action: AdminAction) -> Json<MessageResponse> {
    let scheduled = match action {
        AdminAction::Restart => state.admin.restart(),
        AdminAction::Shutdown => state.admin.shutdown(),
        AdminAction::UpdateAndRestart => state.admin.update_and_restart(),
    };

    metrics::admin_action(action);
    log_security_event(
        &format!("admin_{}", action),
        Some(&actor.user_id),
        if scheduled {
            "Admin action scheduled"
        } else {
            "Admin action ignored, another is pending"
        },
    );

    // Success either way: a pending action already ends the process.
    MessageResponse::ok(match action {
        AdminAction::Restart => "Server is restarting",
        AdminAction::Shutdown => "Server is shutting down",
        AdminAction::UpdateAndRestart => "Updating and restarting",
    })
}
