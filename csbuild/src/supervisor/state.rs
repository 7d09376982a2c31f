//! Supervisor lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the watch supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// Nothing spawned yet.
    Idle,
    /// Watchers are being spawned.
    Starting,
    /// Watchers are live.
    Running,
    /// Shutdown in progress.
    Draining,
    /// Every child is gone. Final.
    Terminated,
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::Idle
    }
}

impl SupervisorState {
    /// Returns true if moving to `next` is allowed.
    ///
    /// Draining is reachable from any live state so a signal during startup
    /// still shuts down cleanly.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Idle | Self::Starting | Self::Running, Self::Draining)
                | (Self::Draining, Self::Terminated)
        )
    }

    /// Returns true for the final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Self::Draining | Self::Terminated)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}
