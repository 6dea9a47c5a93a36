//! External command execution.

use async_trait::async_trait;
use std::{process::Stdio, time::Duration};
use thiserror::Error;
use tokio::process::Command;

/// Output of a successful command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub stdout: String,
    pub exit_code: i32,
}

/// Command execution errors
#[derive(Debug, Error)]
pub enum ShellError {
    /// Program could not be started
    #[error("Failed to start command: {0}")]
    Spawn(#[from] std::io::Error),

    /// Command did not finish in time and was killed
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// Command exited unsuccessfully
    #[error("Command exited with {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
}

/// Runs external programs
#[async_trait]
pub trait ShellRunner: Send + Sync {
    /// Run `program` with `args`, failing if it exceeds `timeout` or exits non-zero
    async fn exec(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ShellOutput, ShellError>;
}

/// [`ShellRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioShellRunner;

impl TokioShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ShellRunner for TokioShellRunner {
    async fn exec(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ShellOutput, ShellError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        log::debug!("exec: {} {}", program, args.join(" "));

        // Dropping the output future on timeout kills the child.
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| ShellError::Timeout(timeout))??;

        if !output.status.success() {
            return Err(ShellError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(ShellOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: output.status.code().unwrap_or(0),
        })
    }
}

/// Split a command line into program and arguments on whitespace
///
/// # Returns
///
/// * `Option<(String, Vec<String>)>` - `None` for a blank command line
pub fn split_command_line(command_line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command_line.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}
