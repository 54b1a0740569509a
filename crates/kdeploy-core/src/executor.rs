//! Command execution
//!
//! Every control-plane interaction goes through a [`CommandExecutor`]: run a
//! tool with arguments, optionally pipe a payload to its stdin, and return
//! captured stdout. [`ProcessExecutor`] is the real implementation; tests
//! substitute a scripted fake.

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Command execution errors
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write input to {tool}: {source}")]
    Input {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with status {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} produced non-UTF-8 output")]
    Encoding { tool: String },
}

/// Runs external tools and captures their output
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a tool and return its stdout
    async fn run_captured(&self, tool: &str, args: &[String]) -> Result<String, CommandError>;

    /// Run a tool with `input` piped to stdin and return its stdout
    async fn run_with_input(
        &self,
        tool: &str,
        args: &[String],
        input: &str,
    ) -> Result<String, CommandError>;
}

/// Executor backed by child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    envs: Vec<(String, String)>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an environment variable on every spawned process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command(&self, tool: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(tool);
        cmd.args(args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn execute(
        &self,
        tool: &str,
        args: &[String],
        input: Option<&str>,
    ) -> Result<String, CommandError> {
        debug!(tool = tool, args = ?args, with_input = input.is_some(), "Running command");

        let mut cmd = self.command(tool, args);
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

        if let (Some(payload), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|source| CommandError::Input {
                    tool: tool.to_string(),
                    source,
                })?;
            // Closing stdin signals end of payload
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| CommandError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                tool: tool.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| CommandError::Encoding {
            tool: tool.to_string(),
        })
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run_captured(&self, tool: &str, args: &[String]) -> Result<String, CommandError> {
        self.execute(tool, args, None).await
    }

    async fn run_with_input(
        &self,
        tool: &str,
        args: &[String],
        input: &str,
    ) -> Result<String, CommandError> {
        self.execute(tool, args, Some(input)).await
    }
}
