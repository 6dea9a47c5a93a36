//! Cookie authentication for protected endpoints.
//!
//! The session token travels in the `jwt` cookie. A request is authenticated
//! when the token verifies; the matching session is then touched, or
//! recreated if the server restarted since login.
//!
//! # Extracting the caller
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use pc_server::api::middleware::AuthUser;
//!
//! async fn protected_handler(Extension(user): Extension<AuthUser>) -> String {
//!     format!("Authenticated as user {}", user.user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::COOKIE},
    middleware::Next,
    response::Response,
};
use pi_cockpit::AuthError;

use super::{AppState, error::ApiError};
use crate::metrics;

/// Name of the session cookie
pub const TOKEN_COOKIE: &str = "jwt";

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub token: String,
}

/// Read the session token from the `Cookie` headers
pub fn token_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Verify the cookie token without touching any session
pub async fn verified_user(state: &AppState, headers: &HeaderMap) -> Option<AuthUser> {
    let token = token_from_cookies(headers)?;
    let claims = state.tokens.verify(&token).await.ok()?;
    Some(AuthUser {
        user_id: claims.sub,
        token,
    })
}

/// Authentication middleware that validates the cookie token and injects [`AuthUser`].
///
/// # Behavior
///
/// - **Success**: Token valid → session touched → `AuthUser` in extensions → next handler
/// - **Missing cookie**: `401 Unauthorized`
/// - **Invalid/expired token or deleted user**: `401 Unauthorized`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = token_from_cookies(request.headers()).ok_or(AuthError::Unauthorized)?;

    let claims = state.tokens.verify(&token).await.map_err(|e| match e {
        AuthError::InvalidToken => AuthError::Unauthorized,
        other => other,
    })?;

    // The subject comes from a verified token, so it may seed a new session.
    state.sessions.touch(&token, Some(&claims.sub)).await;
    metrics::active_sessions(state.sessions.len().await);

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        token,
    });
    Ok(next.run(request).await)
}
