//! Captured server log lines.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use super::{AppState, auth::MessageResponse};
use crate::log_capture::LogEntry;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Only the newest `limit` lines
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.logs.entries(query.limit),
    })
}

pub async fn clear(State(state): State<AppState>) -> Json<MessageResponse> {
    state.logs.clear();
    MessageResponse::ok("Logs cleared")
}
