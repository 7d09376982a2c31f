//! Testing utilities for pipelines and the watch supervisor.
//!
//! This module provides fakes for every process seam:
//! - [`RecordingCommandRunner`] records one-shot and detached commands
//! - [`FakeLauncher`] hands out scripted children with writable pipes
//! - [`FakeBundler`] and [`StaticProbe`] script the bundler and platform probe

mod bundler;
mod commands;
mod processes;

pub use bundler::{FakeBundler, StaticProbe};
pub use commands::RecordingCommandRunner;
pub use processes::{FakeChild, FakeLauncher};
