//! Subprocess-based stage executor.
//!
//! Invokes an external agent command once per pipeline stage, writing the
//! stage input to its stdin and reading the response from its stdout. The
//! command receives the stage name as its first argument; constraints and
//! boundaries travel in environment variables so any agent wrapper can
//! pick them up.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use carecircle_engine::{Stage, StageContext, StageError, StageExecutor};

/// Stage executor that shells out to a configured agent command.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: String,
}

impl CommandExecutor {
    /// Create an executor for the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl StageExecutor for CommandExecutor {
    async fn run_stage(
        &self,
        stage: Stage,
        input: &str,
        ctx: &StageContext,
    ) -> Result<String, StageError> {
        debug!(command = %self.command, stage = %stage, "Spawning agent command");

        let mut child = Command::new(&self.command)
            .arg(stage.name())
            .env("CARECIRCLE_CONSTRAINTS", ctx.constraints_text())
            .env("CARECIRCLE_BOUNDARIES", ctx.boundaries_text())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                StageError::Executor(format!("failed to spawn '{}': {err}", self.command))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|err| StageError::Executor(format!("failed to write input: {err}")))?;
            // Close stdin so the agent sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| StageError::Executor(format!("agent command failed: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::Executor(format!(
                "agent command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|err| StageError::Executor(format!("agent output was not UTF-8: {err}")))
    }
}
