//! Top-level build tasks.

use crate::errors::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The task requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTask {
    /// Wrap the assembled build into a self-contained binary.
    Binary,
    /// Archive a binary into a release package.
    Package,
    /// Clean, compile and assemble the build directory.
    Build,
    /// Development watch mode.
    Watch,
}

impl BuildTask {
    /// All tasks, in help order.
    pub const ALL: [Self; 4] = [Self::Binary, Self::Package, Self::Build, Self::Watch];

    /// Parses an optional task name. There is no default task.
    pub fn parse(name: Option<&str>) -> Result<Self> {
        match name {
            None | Some("") => Err(BuildError::config("No task provided")),
            Some(name) => name.parse(),
        }
    }

    /// Returns the task name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Package => "package",
            Self::Build => "build",
            Self::Watch => "watch",
        }
    }
}

impl fmt::Display for BuildTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildTask {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| BuildError::config(format!("No task matching \"{s}\"")))
    }
}
