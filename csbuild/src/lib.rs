//! # csbuild
//!
//! Build orchestration for code-server.
//!
//! csbuild drives the production build of code-server and its bundled VS Code,
//! packs the result into a single binary, packages releases, and runs the
//! development watch mode:
//!
//! - **Platform resolution**: detect the release target and architecture once
//! - **Staged tasks**: named, timed stages with structured events
//! - **Watch supervision**: one control loop owning every child process
//! - **Bundling**: browser assets through a pluggable [`bundler::Bundler`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use csbuild::prelude::*;
//!
//! let config = BuildConfig::from_env(std::env::current_dir()?)?;
//! let pipeline = Pipeline::system(config, None, None);
//! let code = pipeline.run(BuildTask::Build).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bundler;
pub mod config;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod stream;
pub mod supervisor;
pub mod testing;

pub use errors::{BuildError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bundler::{BundleStatus, Bundler, BundlerEvent, CommandBundler};
    pub use crate::config::{BuildConfig, WatchCommands};
    pub use crate::errors::{BuildError, CommandError, Result};
    pub use crate::events::{BuildEvent, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::pipeline::{BuildTask, Pipeline, TaskRunner};
    pub use crate::platform::{Arch, BuildTarget, PlatformResolver, Target};
    pub use crate::process::{CommandRunner, CommandSpec, ProcessLauncher};
    pub use crate::stream::OutputLine;
    pub use crate::supervisor::{Supervisor, SupervisorHandle, SupervisorState};
}
