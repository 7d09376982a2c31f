//! External process handling.
//!
//! Two seams separate the orchestrator from the operating system:
//! - [`CommandRunner`] for one-shot commands (compile steps, packers, probes)
//!   and fire-and-forget side commands
//! - [`ProcessLauncher`] for long-running children supervised in watch mode
//!
//! [`ManagedProcess`] wraps a launched child with line readers, an exit
//! monitor and kill-and-await termination.

mod command;
mod launcher;
mod managed;
mod runner;

pub use command::CommandSpec;
pub use launcher::{ChildControl, OutputStream, ProcessLauncher, SpawnedChild, SystemLauncher};
pub use managed::{ExitNotice, ManagedProcess, ProcessRole};
pub use runner::{CommandOutput, CommandRunner, SystemCommandRunner};
