//! Error types for csbuild.
//!
//! Errors fall into four groups: configuration errors raised before any
//! process is spawned, stage failures that abort a pipeline, fatal watch-mode
//! failures that trigger a supervised shutdown, and recoverable bundler
//! failures that are only logged.

use std::collections::HashMap;
use thiserror::Error;

/// The main error type for csbuild operations.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required argument or environment value is missing or invalid.
    #[error("{0}")]
    Config(String),

    /// A pipeline stage failed.
    #[error("{stage} failed: {source}")]
    StageFailed {
        /// The stage label.
        stage: String,
        /// The underlying error.
        #[source]
        source: Box<BuildError>,
    },

    /// A one-shot command exited unsuccessfully.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// A child process could not be started.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        /// The command line.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Archive creation failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// A watch-mode supervisor failure.
    #[error("Watch error: {0}")]
    Watch(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wraps an error as the failure of a named stage.
    #[must_use]
    pub fn stage_failed(stage: impl Into<String>, source: Self) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }

    /// Returns true for errors raised before anything was spawned.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an IO `NotFound` error.
    ///
    /// Cleanup of a previous build tolerates these.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::Config(_) => "config",
            Self::StageFailed { .. } => "stage_failed",
            Self::Command(_) => "command_failed",
            Self::Spawn { .. } => "spawn",
            Self::Archive(_) => "archive",
            Self::Watch(_) => "watch",
            Self::Json(_) => "serialization",
            Self::Io(_) => "io",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        if let Self::Command(err) = self {
            map.insert("command".to_string(), serde_json::json!(err.command));
            map.insert("exit_code".to_string(), serde_json::json!(err.code));
        }

        map
    }
}

/// Error raised when a one-shot command exits with a failure status.
#[derive(Debug, Clone, Error)]
#[error(
    "Command `{command}` exited with {}{}",
    describe_code(.code),
    describe_output(.stderr, .stdout)
)]
pub struct CommandError {
    /// The command line that was run.
    pub command: String,
    /// The exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Captured standard error.
    pub stderr: String,
    /// Captured standard output. Shown when stderr is empty, since some
    /// tools (`tsc`) report diagnostics on stdout.
    pub stdout: String,
}

impl CommandError {
    /// Creates a new command error.
    #[must_use]
    pub fn new(command: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            code,
            stderr: stderr.into(),
            stdout: String::new(),
        }
    }

    /// Attaches the captured standard output.
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }
}

/// Lines of stdout kept in the message when stderr is empty.
const STDOUT_TAIL_LINES: usize = 20;

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
}

fn describe_output(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return format!(": {stderr}");
    }

    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let tail = &lines[lines.len().saturating_sub(STDOUT_TAIL_LINES)..];
    format!(": {}", tail.join("\n"))
}

/// Result alias used throughout the crate.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
