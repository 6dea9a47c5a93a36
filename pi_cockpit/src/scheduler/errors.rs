//! Scheduled task error types.

use crate::shell::ShellError;
use std::time::Duration;
use thiserror::Error;

/// Failure of one scheduled task run
#[derive(Debug, Error)]
pub enum TaskError {
    /// External call exceeded its time limit
    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    /// Task ran but did not succeed
    #[error("Task failed: {0}")]
    Failed(String),

    /// A run of the same task is still in progress
    #[error("Task already running")]
    AlreadyRunning,
}

impl From<ShellError> for TaskError {
    fn from(err: ShellError) -> Self {
        match err {
            ShellError::Timeout(after) => TaskError::Timeout(after),
            other => TaskError::Failed(other.to_string()),
        }
    }
}

/// Result type for scheduled task runs
pub type TaskResult<T> = Result<T, TaskError>;
