//! Step execution behind a narrow trait so agents can be tested without a shell.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{PlaneError, Result};
use crate::recipe::Step;

/// Result of running one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// `None` when killed by signal or timeout
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
    pub timed_out: bool,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run `step` with `env` layered over the step's own env.
    ///
    /// `Err` means the step could not be run at all; a non-zero exit is an
    /// `Ok` output.
    async fn execute(&self, step: &Step, env: &BTreeMap<String, String>) -> Result<StepOutput>;
}

/// Runs steps through `<shell> -c <run>`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    default_timeout: Duration,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>, default_timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            default_timeout,
        }
    }
}

#[async_trait]
impl StepExecutor for ShellExecutor {
    async fn execute(&self, step: &Step, env: &BTreeMap<String, String>) -> Result<StepOutput> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&step.run);
        if let Some(cwd) = &step.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in step.env.iter().chain(env.iter()) {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| PlaneError::ExecutionFailure(format!("cannot start {}: {}", self.shell, e)))?;
        let timeout = step.timeout.map(Duration::from_secs).unwrap_or(self.default_timeout);

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => {
                let output = result
                    .map_err(|e| PlaneError::ExecutionFailure(format!("waiting on {} failed: {}", self.shell, e)))?;
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(StepOutput {
                    exit_code: output.status.code(),
                    output: text,
                    timed_out: false,
                })
            }
            Err(_) => Ok(StepOutput {
                exit_code: None,
                output: format!("timed out after {}s", timeout.as_secs()),
                timed_out: true,
            }),
        }
    }
}
