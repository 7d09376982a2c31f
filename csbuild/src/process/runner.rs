//! One-shot command execution.

use super::CommandSpec;
use crate::errors::{BuildError, CommandError, Result};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Creates a successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Returns true if the command exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Converts a failed output into an error.
    pub fn into_result(self, command: &CommandSpec) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::new(command.to_string(), self.code, self.stderr)
                .with_stdout(self.stdout)
                .into())
        }
    }
}

/// Seam for running one-shot commands.
///
/// Pipelines run compile and packaging steps through this trait; watch mode
/// uses it to fire side commands without waiting for them.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion and captures its output.
    ///
    /// A non-zero exit is not an error here; only a failure to spawn is.
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput>;

    /// Runs the command and fails unless it exits with code 0.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.output(command).await?.into_result(command)
    }

    /// Starts the command in the background without waiting for it.
    ///
    /// Failures are logged by the background task and never reported back.
    fn spawn_detached(&self, command: CommandSpec);
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    /// Creates a new runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %command, cwd = ?command.cwd, "Running command");
        let start = Instant::now();

        let output = command
            .to_command()
            .output()
            .await
            .map_err(|e| BuildError::spawn(command.to_string(), e))?;

        debug!(
            command = %command,
            code = ?output.status.code(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Command finished"
        );

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn_detached(&self, command: CommandSpec) {
        let runner = *self;
        tokio::spawn(async move {
            match runner.run(&command).await {
                Ok(_) => info!(command = %command, "Background command finished"),
                Err(e) => warn!(command = %command, error = %e, "Background command failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result_success() {
        let spec = CommandSpec::new("true");
        let output = CommandOutput::ok("done").into_result(&spec).unwrap();
        assert_eq!(output.stdout, "done");
    }

    #[test]
    fn test_into_result_failure_keeps_stderr() {
        let spec = CommandSpec::new("tsc");
        let output = CommandOutput {
            code: Some(2),
            stdout: String::new(),
            stderr: "src/node/entry.ts(1,1): error TS1005".to_string(),
        };

        let err = output.into_result(&spec).unwrap_err();
        match err {
            BuildError::Command(e) => {
                assert_eq!(e.code, Some(2));
                assert!(e.stderr.contains("TS1005"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);

        let output = runner.output(&spec).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(runner.run(&spec).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_reports_stdout_diagnostics() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "printf 'error TS%s\\n' 2304; exit 2"]);

        let err = runner.run(&spec).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("exited with code 2"));
        assert!(message.contains("error TS2304"));
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("csbuild-definitely-not-installed");

        let err = runner.output(&spec).await.unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }
}
