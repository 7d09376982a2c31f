//! C library version probing.

use crate::errors::BuildError;
use crate::process::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::sync::Arc;

/// Result of running the C library version probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The probe ran. Some tools print their version on stderr and exit
    /// non-zero, so both streams are kept regardless of the exit code.
    Completed {
        /// Exit code of the probe.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The probe could not be started (for example the tool is absent).
    Unavailable(String),
}

impl ProbeOutcome {
    /// Returns true if either output stream mentions musl.
    #[must_use]
    pub fn mentions_musl(&self) -> bool {
        match self {
            Self::Completed { stdout, stderr, .. } => {
                stdout.contains("musl") || stderr.contains("musl")
            }
            Self::Unavailable(_) => false,
        }
    }
}

/// Seam for the version probe.
#[async_trait]
pub trait VersionProbe: Send + Sync {
    /// Runs the probe once.
    async fn probe(&self) -> ProbeOutcome;
}

/// Runs `ldd --version` through a [`CommandRunner`].
pub struct LddProbe {
    runner: Arc<dyn CommandRunner>,
}

impl LddProbe {
    /// Creates a probe using the given runner.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// The probe command line.
    #[must_use]
    pub fn command() -> CommandSpec {
        CommandSpec::new("ldd").arg("--version")
    }
}

impl std::fmt::Debug for LddProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LddProbe").finish_non_exhaustive()
    }
}

#[async_trait]
impl VersionProbe for LddProbe {
    async fn probe(&self) -> ProbeOutcome {
        match self.runner.output(&Self::command()).await {
            Ok(output) => ProbeOutcome::Completed {
                code: output.code,
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Err(BuildError::Spawn { source, .. }) => ProbeOutcome::Unavailable(source.to_string()),
            Err(e) => ProbeOutcome::Unavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::testing::RecordingCommandRunner;

    #[tokio::test]
    async fn test_ldd_probe_keeps_stderr_of_failed_run() {
        let runner = Arc::new(RecordingCommandRunner::new());
        runner.respond(
            "ldd",
            CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "musl libc (x86_64)\nVersion 1.2.4".to_string(),
            },
        );

        let outcome = LddProbe::new(runner.clone()).probe().await;

        assert!(outcome.mentions_musl());
        assert_eq!(runner.commands(), vec!["ldd --version".to_string()]);
    }

    #[tokio::test]
    async fn test_ldd_probe_missing_tool_is_unavailable() {
        let runner = Arc::new(RecordingCommandRunner::new());
        runner.fail_to_spawn("ldd");

        let outcome = LddProbe::new(runner).probe().await;

        assert!(matches!(outcome, ProbeOutcome::Unavailable(_)));
        assert!(!outcome.mentions_musl());
    }
}
