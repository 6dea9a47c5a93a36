//! High scores for the dashboard's mini game.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::sync::RwLock;

/// Scores kept in memory
pub const MAX_SCORES: usize = 100;

/// Scores written to disk
pub const PERSISTED_SCORES: usize = 10;

/// User id recorded for scores submitted without a login
pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub score: i64,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreFile {
    #[serde(default)]
    top_scores: Vec<Score>,
}

/// Sorted high-score table backed by a JSON file
pub struct ScoreBoard {
    path: PathBuf,
    scores: RwLock<Vec<Score>>,
}

impl ScoreBoard {
    /// Load from `path`; a missing or unreadable file starts an empty board
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let scores = match read_scores(&path).await {
            Ok(mut scores) => {
                sort_desc(&mut scores);
                log::info!("Loaded {} score(s) from {}", scores.len(), path.display());
                scores
            }
            Err(ScoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                log::info!("No scores file at {}, starting fresh", path.display());
                Vec::new()
            }
            Err(e) => {
                log::warn!("Ignoring unreadable scores file {}: {}", path.display(), e);
                Vec::new()
            }
        };

        Self {
            path,
            scores: RwLock::new(scores),
        }
    }

    /// Record a score and persist the top entries
    pub async fn add(&self, score: i64, user_id: &str) -> Result<Score, ScoreError> {
        let entry = Score {
            score,
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        };

        let mut scores = self.scores.write().await;
        scores.push(entry.clone());
        sort_desc(&mut scores);
        scores.truncate(MAX_SCORES);
        self.persist(&scores).await?;
        Ok(entry)
    }

    /// Best `limit` scores, highest first
    pub async fn top(&self, limit: usize) -> Vec<Score> {
        self.scores.read().await.iter().take(limit).cloned().collect()
    }

    /// Remove every score
    pub async fn reset(&self) -> Result<(), ScoreError> {
        let mut scores = self.scores.write().await;
        scores.clear();
        self.persist(&scores).await?;
        log::info!("Scores reset");
        Ok(())
    }

    async fn persist(&self, scores: &[Score]) -> Result<(), ScoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = ScoreFile {
            top_scores: scores.iter().take(PERSISTED_SCORES).cloned().collect(),
        };
        tokio::fs::write(&self.path, serde_json::to_string_pretty(&file)?).await?;
        Ok(())
    }
}

async fn read_scores(path: &Path) -> Result<Vec<Score>, ScoreError> {
    let contents = tokio::fs::read_to_string(path).await?;
    let file: ScoreFile = serde_json::from_str(&contents)?;
    Ok(file.top_scores)
}

// Stable, so equal scores keep submission order.
fn sort_desc(scores: &mut [Score]) {
    scores.sort_by(|a, b| b.score.cmp(&a.score));
}
