//! Authentication API handlers.
//!
//! Login sets an HttpOnly `jwt` cookie that lives exactly as long as the
//! token; logout clears it.
//!
//! # Examples
//!
//! Login:
//! ```bash
//! curl -i -X POST http://localhost:3000/api/login \
//!   -d 'email=user1@example.com' -d 'password=1'
//! ```
//!
//! Ask for an account:
//! ```bash
//! curl -X POST http://localhost:3000/api/request-access \
//!   -d 'email=new@example.com' -d 'password=secret' -d 'name=New User'
//! ```

use axum::{
    Extension, Form, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use pi_cockpit::AuthError;
use serde::{Deserialize, Serialize};

use super::{
    AppState,
    error::{ApiError, ApiResult},
    middleware::{AuthUser, TOKEN_COOKIE, verified_user},
};
use crate::{
    logging::{log_account_event, log_security_event},
    metrics,
};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AccessRequestForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub logged_in: bool,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// `Set-Cookie` value carrying a fresh session token
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Lax",
        TOKEN_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie
pub fn cleared_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

fn with_cookie(mut response: Response, cookie: &str) -> ApiResult<Response> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|_| ApiError::BadRequest("Malformed cookie value".to_string()))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}

/// Log in with email and password.
///
/// # Response
///
/// `200 OK` with `{"success": true, "userId": "..."}` and the session cookie.
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown email or wrong password (indistinguishable)
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Response> {
    let Some(credential) = state.users.validate(&form.email, &form.password).await? else {
        metrics::login_attempt(false);
        log_security_event(
            "failed_login",
            None,
            &format!("Invalid credentials for {}", form.email),
        );
        return Err(AuthError::InvalidCredentials.into());
    };

    let token = state.tokens.issue(&credential.id)?;
    let session = state.sessions.create(&credential.id, &token).await;
    metrics::login_attempt(true);
    metrics::active_sessions(state.sessions.len().await);
    log_account_event(
        "login",
        &credential.id,
        &format!("Session {} started", session.id),
    );

    let response = Json(LoginResponse {
        success: true,
        user_id: credential.id,
    })
    .into_response();
    with_cookie(
        response,
        &session_cookie(
            &token,
            state.tokens.token_lifetime_secs(),
            state.cookie_secure,
        ),
    )
}

/// End the current session and clear the cookie.
///
/// The token's cached verification is purged. The token itself stays
/// cryptographically valid until it expires.
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Response> {
    state.sessions.remove(&user.token).await;
    state.tokens.invalidate(&user.token).await;
    metrics::active_sessions(state.sessions.len().await);
    log_account_event("logout", &user.user_id, "Logged out");

    let response = MessageResponse::ok("Logged out").into_response();
    with_cookie(response, &cleared_cookie(state.cookie_secure))
}

/// Report whether the caller holds a valid token.
pub async fn whoami(State(state): State<AppState>, headers: HeaderMap) -> Json<WhoAmIResponse> {
    let user = verified_user(&state, &headers).await;
    Json(WhoAmIResponse {
        logged_in: user.is_some(),
        user_id: user.map(|u| u.user_id),
    })
}

/// File a pending access request for an administrator to approve.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed email or empty password
/// - `409 Conflict`: Email already registered or already pending
pub async fn request_access(
    State(state): State<AppState>,
    Form(form): Form<AccessRequestForm>,
) -> ApiResult<Json<MessageResponse>> {
    let request = state
        .users
        .request_access(&form.email, &form.password, &form.name)
        .await?;
    tracing::info!(request_id = %request.id, email = %request.email, "Access request filed");
    Ok(MessageResponse::ok(
        "Request submitted. An administrator will review it.",
    ))
}
