//! Recording command runner.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::errors::{BuildError, Result};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

/// A command runner that records every command instead of running it.
///
/// Commands succeed with empty output unless a response was registered for
/// their full command line or their program.
#[derive(Debug, Default)]
pub struct RecordingCommandRunner {
    commands: Mutex<Vec<CommandSpec>>,
    detached: Mutex<Vec<CommandSpec>>,
    responses: Mutex<HashMap<String, CommandOutput>>,
    spawn_failures: Mutex<HashSet<String>>,
}

impl RecordingCommandRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the output for a command line or a program name.
    pub fn respond(&self, command: impl Into<String>, output: CommandOutput) {
        self.responses.lock().insert(command.into(), output);
    }

    /// Makes the command line or program fail with the given exit code.
    pub fn fail(&self, command: impl Into<String>, code: i32, stderr: impl Into<String>) {
        self.respond(
            command,
            CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.into(),
            },
        );
    }

    /// Makes the program fail to spawn.
    pub fn fail_to_spawn(&self, program: impl Into<String>) {
        self.spawn_failures.lock().insert(program.into());
    }

    /// Returns the awaited command lines in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().iter().map(ToString::to_string).collect()
    }

    /// Returns the awaited commands in order.
    #[must_use]
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.commands.lock().clone()
    }

    /// Returns the detached command lines in order.
    #[must_use]
    pub fn detached(&self) -> Vec<String> {
        self.detached.lock().iter().map(ToString::to_string).collect()
    }

    fn response_for(&self, command: &CommandSpec) -> CommandOutput {
        let responses = self.responses.lock();
        responses
            .get(&command.to_string())
            .or_else(|| responses.get(&command.program))
            .cloned()
            .unwrap_or_else(|| CommandOutput::ok(""))
    }
}

#[async_trait]
impl CommandRunner for RecordingCommandRunner {
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.commands.lock().push(command.clone());
        if self.spawn_failures.lock().contains(&command.program) {
            return Err(BuildError::spawn(
                command.to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            ));
        }
        Ok(self.response_for(command))
    }

    fn spawn_detached(&self, command: CommandSpec) {
        self.detached.lock().push(command);
    }
}
