//! Test doubles shared by unit tests.

use crate::{
    admin::ProcessSupervisor,
    shell::{ShellError, ShellOutput, ShellRunner},
};
use async_trait::async_trait;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

type Script = dyn Fn(&str, &[&str]) -> Result<ShellOutput, ShellError> + Send + Sync;

/// Shell runner answering from a closure and recording every command line
pub struct ScriptedShell {
    script: Box<Script>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&str, &[&str]) -> Result<ShellOutput, ShellError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every command sleeps for `delay` before answering
    pub fn slow<F>(delay: Duration, script: F) -> Arc<Self>
    where
        F: Fn(&str, &[&str]) -> Result<ShellOutput, ShellError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShellRunner for ScriptedShell {
    async fn exec(
        &self,
        program: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<ShellOutput, ShellError> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().unwrap().push(line);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(program, args)
    }
}

pub fn stdout(text: &str) -> Result<ShellOutput, ShellError> {
    Ok(ShellOutput {
        stdout: text.to_string(),
        exit_code: 0,
    })
}

pub fn exit_failure(stderr: &str) -> Result<ShellOutput, ShellError> {
    Err(ShellError::NonZeroExit {
        code: Some(1),
        stderr: stderr.to_string(),
    })
}

/// Supervisor that records requests instead of exiting
#[derive(Default)]
pub struct RecordingSupervisor {
    requests: Mutex<Vec<&'static str>>,
}

impl RecordingSupervisor {
    pub fn requests(&self) -> Vec<&'static str> {
        self.requests.lock().unwrap().clone()
    }
}

impl ProcessSupervisor for RecordingSupervisor {
    fn request_restart(&self) {
        self.requests.lock().unwrap().push("restart");
    }

    fn request_shutdown(&self) {
        self.requests.lock().unwrap().push("shutdown");
    }
}
