//! Build pipelines.
//!
//! A [`Pipeline`] resolves the build target once, then runs exactly one
//! [`BuildTask`]: the production build, the binary packer, release
//! packaging, or watch mode. Production tasks are sequences of stages run
//! through a [`TaskRunner`].

pub mod archive;
mod build;
pub mod fs;
mod release;
mod runner;
mod task;

pub use runner::TaskRunner;
pub use task::BuildTask;

use crate::bundler::{Bundler, CommandBundler};
use crate::config::BuildConfig;
use crate::errors::Result;
use crate::events::{EventSink, LoggingEventSink};
use crate::platform::{Arch, HostFacts, LddProbe, PlatformResolver, Target};
use crate::process::{CommandRunner, ProcessLauncher, SystemCommandRunner, SystemLauncher};
use crate::supervisor::{forward_signals, Supervisor};
use std::sync::Arc;
use tracing::info;

/// Runs build tasks for one repository.
pub struct Pipeline {
    config: BuildConfig,
    resolver: PlatformResolver,
    runner: Arc<dyn CommandRunner>,
    launcher: Arc<dyn ProcessLauncher>,
    bundler: Arc<dyn Bundler>,
    sink: Arc<dyn EventSink>,
}

impl Pipeline {
    /// Creates a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        config: BuildConfig,
        resolver: PlatformResolver,
        runner: Arc<dyn CommandRunner>,
        launcher: Arc<dyn ProcessLauncher>,
        bundler: Arc<dyn Bundler>,
    ) -> Self {
        Self {
            config,
            resolver,
            runner,
            launcher,
            bundler,
            sink: Arc::new(LoggingEventSink::default()),
        }
    }

    /// Creates a pipeline that runs real processes.
    #[must_use]
    pub fn system(config: BuildConfig, target: Option<Target>, arch: Option<Arch>) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(SystemLauncher);
        let probe = Arc::new(LddProbe::new(runner.clone()));
        let resolver = PlatformResolver::new(HostFacts::current(), probe)
            .with_target(target)
            .with_arch(arch);
        let bundler = Arc::new(CommandBundler::new(&config.root, runner.clone(), launcher.clone()));
        Self::new(config, resolver, runner, launcher, bundler)
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Runs one task and returns the process exit code.
    pub async fn run(&self, task: BuildTask) -> Result<i32> {
        let version = self.config.resolve_version().await?;
        let target = self.resolver.resolve_build_target(version).await?;
        info!(task = %task, artifact = %target.artifact_name(), "Running task");

        let runner = TaskRunner::new(task.as_str(), self.sink.clone());
        match task {
            BuildTask::Build => self.build(&runner, &target).await.map(|()| 0),
            BuildTask::Binary => self.binary(&runner, &target).await.map(|_| 0),
            BuildTask::Package => self.package(&runner, &target).await.map(|_| 0),
            BuildTask::Watch => self.watch().await,
        }
    }

    async fn watch(&self) -> Result<i32> {
        let supervisor = Supervisor::new(
            self.config.watch_commands(),
            self.launcher.clone(),
            self.runner.clone(),
            self.bundler.clone(),
        )
        .with_auto_patch(self.config.auto_patch)
        .with_event_sink(self.sink.clone());

        let signals = forward_signals(supervisor.handle())?;
        let code = supervisor.run().await;
        signals.abort();
        code
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::pipeline;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_watch_returns_supervisor_exit_code() {
        let dir = TempDir::new().unwrap();
        let (pipeline, fx) = pipeline(BuildConfig::new(dir.path()), Target::Linux);

        let launcher = fx.launcher.clone();
        let stopper = tokio::spawn(async move {
            let editor = launcher.wait_for_launch("yarn", 1).await.unwrap();
            launcher.wait_for_launch("tsc", 1).await.unwrap();
            editor.exit(Some(3));
        });

        let code = pipeline.run(BuildTask::Watch).await.unwrap();
        stopper.await.unwrap();

        assert_eq!(code, 3);
        assert!(fx.bundler.is_stopped());
    }
}
