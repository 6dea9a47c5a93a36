//! Session listing and bulk revocation.

use axum::{Extension, Json, extract::State};
use pi_cockpit::{SessionRegistry, auth::Session};
use serde::Serialize;
use std::{sync::Arc, time::Duration};

use super::{AppState, middleware::AuthUser};
use crate::{logging::log_security_event, metrics};

/// How often idle sessions are swept outside of logins
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsResponse {
    pub sessions: Vec<Session>,
    /// SSO application token, when SSO is configured and acquired
    pub app_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub success: bool,
    pub revoked: usize,
}

/// Live sessions plus the SSO application token
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let app_token = match &state.sso {
        Some(sso) => sso.app_token().await,
        None => None,
    };

    Json(SessionsResponse {
        sessions: state.sessions.list().await,
        app_token,
    })
}

/// Drop every session and the whole verification cache.
///
/// Tokens held by clients remain valid until expiry; a request carrying one
/// re-verifies against the user store and opens a new session.
pub async fn revoke_all(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
) -> Json<RevokeResponse> {
    let revoked = state.sessions.revoke_all().await;
    state.tokens.clear_cache().await;
    metrics::active_sessions(0);

    log_security_event(
        "sessions_revoked",
        Some(&actor.user_id),
        &format!("Revoked {} session(s)", revoked),
    );
    Json(RevokeResponse {
        success: true,
        revoked,
    })
}

/// Periodically remove idle sessions
pub fn spawn_session_sweeper(
    sessions: Arc<SessionRegistry>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = sessions.sweep_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Swept idle sessions");
            }
            metrics::active_sessions(sessions.len().await);
        }
    })
}
