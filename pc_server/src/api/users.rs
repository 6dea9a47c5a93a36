//! User and access-request administration.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use pi_cockpit::auth::{AccessRequest, UserSummary};
use serde::{Deserialize, Serialize};

use super::{AppState, auth::MessageResponse, error::ApiResult, middleware::AuthUser};
use crate::{logging::log_security_event, metrics};

#[derive(Debug, Deserialize)]
pub struct CreateUserPayload {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedUserResponse {
    pub success: bool,
    pub user: UserSummary,
}

/// List every account
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(state.users.list().await?))
}

/// Create an account directly.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed email or empty password
/// - `409 Conflict`: Email already registered
pub async fn create_user(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Json(payload): Json<CreateUserPayload>,
) -> ApiResult<Json<CreatedUserResponse>> {
    let credential = state
        .users
        .create(&payload.email, &payload.password, &payload.name)
        .await?;
    log_security_event(
        "user_created",
        Some(&actor.user_id),
        &format!("Created user {} ({})", credential.id, credential.email),
    );

    Ok(Json(CreatedUserResponse {
        success: true,
        user: UserSummary::from(&credential),
    }))
}

/// Delete an account and end its sessions.
///
/// # Errors
///
/// - `404 Not Found`: No such user
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.users.delete(&user_id).await?;

    let tokens = state.sessions.remove_for_user(&user_id).await;
    let ended = tokens.len();
    state.tokens.invalidate_all(tokens).await;
    metrics::active_sessions(state.sessions.len().await);

    log_security_event(
        "user_deleted",
        Some(&actor.user_id),
        &format!("Deleted user {} and {} session(s)", user_id, ended),
    );
    Ok(MessageResponse::ok("User deleted"))
}

/// Pending access requests, oldest first
pub async fn list_requests(State(state): State<AppState>) -> ApiResult<Json<Vec<AccessRequest>>> {
    Ok(Json(state.users.pending_requests().await?))
}

/// Approve a pending request, creating the account.
///
/// # Errors
///
/// - `404 Not Found`: No such request
/// - `409 Conflict`: Request no longer pending, or email taken meanwhile
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<CreatedUserResponse>> {
    let credential = state.users.approve(&request_id).await?;
    log_security_event(
        "request_approved",
        Some(&actor.user_id),
        &format!("Approved request {} as user {}", request_id, credential.id),
    );

    Ok(Json(CreatedUserResponse {
        success: true,
        user: UserSummary::from(&credential),
    }))
}

/// Reject a pending request.
///
/// # Errors
///
/// - `404 Not Found`: No such request
/// - `409 Conflict`: Request no longer pending
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthUser>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.users.reject(&request_id).await?;
    log_security_event(
        "request_rejected",
        Some(&actor.user_id),
        &format!("Rejected request {}", request_id),
    );
    Ok(MessageResponse::ok("Request rejected"))
}
