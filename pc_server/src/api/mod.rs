//! HTTP API for the dashboard server.
//!
//! # Modules
//!
//! - [`auth`]: Login, logout, whoami and access requests
//! - [`users`]: Account and access-request administration
//! - [`sessions`]: Session listing and bulk revocation
//! - [`speedtest`]: Manual runs, history and scheduler control
//! - [`admin`]: System settings, restart, shutdown and update
//! - [`scores`]: Mini-game scoreboard
//! - [`led`]: Onboard LED status and trigger selection
//! - [`logs`]: Recently captured log lines
//! - [`middleware`]: Cookie authentication for protected endpoints
//! - [`request_id`]: Request correlation ids
//!
//! # Endpoints Overview
//!
//! ## Public
//! - `POST /api/login` - Log in, sets the `jwt` cookie
//! - `POST /api/request-access` - Ask an administrator for an account
//! - `GET /api/whoami` - Whether the cookie holds a valid token
//! - `GET /api/scores`, `POST /api/scores` - Scoreboard (anonymous without a cookie)
//! - `GET /health` - Server health status
//!
//! ## Authenticated
//! - `POST /api/logout`
//! - `GET|POST /api/users`, `DELETE /api/users/{user_id}`
//! - `GET /api/user-requests`, `POST /api/user-requests/{id}/approve`,
//!   `DELETE /api/user-requests/{id}`
//! - `GET /api/sessions`, `POST /api/sessions/revoke-all`
//! - `POST /api/speedtest`, `GET /api/speedtest/history`,
//!   `POST /api/speedtest/history/clear`, `GET|POST /api/speedtest/interval`
//! - `POST /api/admin/speedtest/toggle`, `GET /api/admin/speedtest/status`
//! - `GET /api/settings`, `POST /api/settings/auto-update`
//! - `POST /api/admin/restart`, `POST /api/admin/shutdown`, `POST /api/admin/update`
//! - `DELETE /api/scores`
//! - `GET /api/led/status`, `POST /api/led/config`
//! - `GET /api/logs`, `POST /api/logs/clear`
//!
//! # CORS
//!
//! CORS is configured permissively; the dashboard is served from the same
//! device and port in production.

pub mod admin;
pub mod auth;
pub mod error;
pub mod led;
pub mod logs;
pub mod middleware;
pub mod request_id;
pub mod scores;
pub mod sessions;
pub mod speedtest;
pub mod users;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use pi_cockpit::{
    AdminControl, Database, SessionRegistry, TokenService, UserStore, led::LedService,
    scores::ScoreBoard, settings::SettingsStore, speedtest::SpeedTestService, sso::SsoProvider,
    update::AutoUpdateService,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::log_capture::LogBuffer;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request (cheap due to Arc wrappers). Every component is
/// injected, so tests build a fresh state per case.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionRegistry>,
    pub users: Arc<UserStore>,
    pub speedtest: Arc<SpeedTestService>,
    pub auto_update: Arc<AutoUpdateService>,
    pub settings: SettingsStore,
    pub admin: AdminControl,
    pub scores: Arc<ScoreBoard>,
    pub led: Arc<LedService>,
    /// Lines captured by the logging layer
    pub logs: LogBuffer,
    /// Absent unless SSO is configured
    pub sso: Option<Arc<dyn SsoProvider>>,
    pub database: Database,
    /// Add `Secure` to the session cookie
    pub cookie_secure: bool,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use pc_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    // Public routes (no authentication middleware)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/login", post(auth::login))
        .route("/api/request-access", post(auth::request_access))
        .route("/api/whoami", get(auth::whoami))
        .route("/api/scores", get(scores::list).post(scores::submit));

    // Protected routes (require authentication middleware)
    let protected_routes = Router::new()
        .route("/api/logout", post(auth::logout))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route("/api/users/{user_id}", delete(users::delete_user))
        .route("/api/user-requests", get(users::list_requests))
        .route(
            "/api/user-requests/{request_id}/approve",
            post(users::approve_request),
        )
        .route(
            "/api/user-requests/{request_id}",
            delete(users::reject_request),
        )
        .route("/api/sessions", get(sessions::list_sessions))
        .route("/api/sessions/revoke-all", post(sessions::revoke_all))
        .route("/api/speedtest", post(speedtest::run))
        .route("/api/speedtest/history", get(speedtest::history))
        .route(
            "/api/speedtest/history/clear",
            post(speedtest::clear_history),
        )
        .route(
            "/api/speedtest/interval",
            get(speedtest::get_interval).post(speedtest::set_interval),
        )
        .route("/api/admin/speedtest/toggle", post(speedtest::toggle))
        .route("/api/admin/speedtest/status", get(speedtest::status))
        .route("/api/settings", get(admin::get_settings))
        .route("/api/settings/auto-update", post(admin::set_auto_update))
        .route("/api/admin/restart", post(admin::restart))
        .route("/api/admin/shutdown", post(admin::shutdown))
        .route("/api/admin/update", post(admin::update))
        .route("/api/scores", delete(scores::reset))
        .route("/api/led/status", get(led::status))
        .route("/api/led/config", post(led::update_config))
        .route("/api/logs", get(logs::list))
        .route("/api/logs/clear", post(logs::clear))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Parse a form flag: `true`/`false`, `1`/`0`, `on`/`off`, `yes`/`no`
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Health check endpoint for monitoring.
///
/// # Response
///
/// Returns `200 OK` when the database answers, `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:3000/health
/// # {"status":"healthy","version":"1.4.0","database":true,"timestamp":"2026-10-18T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = state.database.health_check().await.is_ok();

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
