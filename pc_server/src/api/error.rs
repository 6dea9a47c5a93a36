//! HTTP error mapping.
//!
//! Domain errors become a status code plus `{"error": "..."}`. Internal
//! failures are logged and reported with a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pi_cockpit::{AuthError, SettingsError, TaskError, led::LedError, scores::ScoreError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Scores(#[from] ScoreError),

    #[error(transparent)]
    Led(#[from] LedError),

    #[error("{0}")]
    BadRequest(String),
}

const INTERNAL: &str = "Internal server error";

impl ApiError {
    /// Status code and client-safe message
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Auth(e) => {
                let status = match e {
                    AuthError::InvalidToken
                    | AuthError::Unauthorized
                    | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                    AuthError::Validation(_) => StatusCode::BAD_REQUEST,
                    AuthError::NotFound(_) => StatusCode::NOT_FOUND,
                    AuthError::AlreadyProcessed | AuthError::DuplicateEmail => {
                        StatusCode::CONFLICT
                    }
                    AuthError::Database(_) | AuthError::HashingFailed | AuthError::Signing(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.client_message())
            }
            ApiError::Settings(e) | ApiError::Led(LedError::Settings(e)) => settings_status(e),
            ApiError::Led(e) => match e {
                LedError::InvalidMode(_) | LedError::UnsupportedMode { .. } => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                LedError::Unavailable | LedError::NoTriggers | LedError::NoFallback => {
                    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string()),
            },
            ApiError::Task(TaskError::AlreadyRunning) => (
                StatusCode::CONFLICT,
                "A speed test is already running".to_string(),
            ),
            ApiError::Task(_) | ApiError::Scores(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
        }
    }
}

fn settings_status(e: &SettingsError) -> (StatusCode, String) {
    match e {
        SettingsError::UpdateInProgress => (StatusCode::CONFLICT, e.to_string()),
        SettingsError::InvalidInterval(_) => (
            StatusCode::BAD_REQUEST,
            "Interval must be a positive number of seconds".to_string(),
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_string()),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(ErrorResponse { error })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
