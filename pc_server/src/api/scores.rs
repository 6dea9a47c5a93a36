//! Mini-game scoreboard.

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use pi_cockpit::scores::{ANONYMOUS_USER, Score};
use serde::{Deserialize, Serialize};

use super::{AppState, auth::MessageResponse, error::ApiResult, middleware::verified_user};

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SubmitScore {
    pub score: i64,
}

#[derive(Debug, Deserialize)]
pub struct ScoreQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreView {
    pub score: i64,
    pub user_id: String,
    /// Email of the player, or `Anonymous`
    pub player: String,
    pub timestamp: DateTime<Utc>,
}

/// Record a score; callers without a valid cookie play anonymously
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SubmitScore>,
) -> ApiResult<Json<Score>> {
    let user_id = verified_user(&state, &headers)
        .await
        .map(|u| u.user_id)
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());

    Ok(Json(state.scores.add(payload.score, &user_id).await?))
}

/// Top scores with player emails
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ScoreQuery>,
) -> ApiResult<Json<Vec<ScoreView>>> {
    let top = state.scores.top(query.limit.unwrap_or(DEFAULT_LIMIT)).await;

    let mut views = Vec::with_capacity(top.len());
    for score in top {
        let player = if score.user_id == ANONYMOUS_USER {
            None
        } else {
            state.users.email_of(&score.user_id).await?
        };
        views.push(ScoreView {
            score: score.score,
            user_id: score.user_id,
            player: player.unwrap_or_else(|| "Anonymous".to_string()),
            timestamp: score.timestamp,
        });
    }
    Ok(Json(views))
}

pub async fn reset(State(state): State<AppState>) -> ApiResult<Json<MessageResponse>> {
    state.scores.reset().await?;
    Ok(MessageResponse::ok("Scores reset"))
}
