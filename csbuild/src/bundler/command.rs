//! Bundler driven through the `parcel` command line.

use super::{Bundler, BundlerEvent, BundlerWatch};
use crate::errors::Result;
use crate::process::{
    CommandRunner, CommandSpec, ManagedProcess, ProcessLauncher, ProcessRole,
};
use crate::stream::OutputLine;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

const ENTRY_POINTS: [&str; 4] = [
    "src/browser/register.ts",
    "src/browser/serviceWorker.ts",
    "src/browser/pages/login.ts",
    "src/browser/pages/vscode.ts",
];

/// Turns parcel console output into bundler events.
#[derive(Debug, Default)]
pub struct ParcelOutput {
    started: Option<Instant>,
}

impl ParcelOutput {
    /// Creates a classifier with no build in progress.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps one output line to an event, if it reports progress.
    pub fn classify(&mut self, line: &OutputLine) -> Option<BundlerEvent> {
        let text = line.stripped.trim();
        if text.is_empty() {
            return None;
        }
        if text.contains("Built in") {
            let duration = self.started.take().map(|s| s.elapsed());
            return Some(BundlerEvent::BuildEnd { duration });
        }
        if text.starts_with('🚨') || text.starts_with("Error") || text.contains("Build failed") {
            self.started = None;
            let message = text.trim_start_matches('🚨').trim().to_string();
            return Some(BundlerEvent::BuildError(message));
        }
        if text.starts_with("Building") || text.contains("Bundling") {
            self.started.get_or_insert_with(Instant::now);
            return Some(BundlerEvent::BuildStart);
        }
        None
    }
}

/// Runs parcel as an external command.
pub struct CommandBundler {
    runner: Arc<dyn CommandRunner>,
    launcher: Arc<dyn ProcessLauncher>,
    build: CommandSpec,
    watch: CommandSpec,
}

impl CommandBundler {
    /// Creates a bundler for the repository root.
    #[must_use]
    pub fn new(
        root: &Path,
        runner: Arc<dyn CommandRunner>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let build = CommandSpec::new("parcel")
            .arg("build")
            .args(["--out-dir", "dist", "--public-url", "/dist", "--no-source-maps"])
            .args(ENTRY_POINTS)
            .current_dir(root);
        let watch = CommandSpec::new("parcel")
            .arg("watch")
            .args(["--out-dir", "dist", "--public-url", "/dist"])
            .args(ENTRY_POINTS)
            .current_dir(root);
        Self {
            runner,
            launcher,
            build,
            watch,
        }
    }

    /// Returns the production build command.
    #[must_use]
    pub fn build_command(&self) -> &CommandSpec {
        &self.build
    }

    /// Returns the watch command.
    #[must_use]
    pub fn watch_command(&self) -> &CommandSpec {
        &self.watch
    }
}

impl std::fmt::Debug for CommandBundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBundler")
            .field("build", &self.build.to_string())
            .field("watch", &self.watch.to_string())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn bundle(&self) -> Result<()> {
        let started = Instant::now();
        self.runner.run(&self.build).await?;
        debug!(duration_ms = started.elapsed().as_millis() as u64, "Bundle finished");
        Ok(())
    }

    async fn watch(&self) -> Result<BundlerWatch> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut classifier = ParcelOutput::new();
        let exit_tx = events_tx.clone();

        let mut process = ManagedProcess::spawn(
            ProcessRole::Bundler,
            &self.watch,
            self.launcher.as_ref(),
            move |line| {
                if let Some(event) = classifier.classify(&line) {
                    let _ = events_tx.send(event);
                }
            },
            move |notice| {
                let _ = exit_tx.send(BundlerEvent::BuildError(format!(
                    "bundler exited with {}",
                    notice.code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
                )));
            },
        )?;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            process.terminate().await;
        });

        Ok(BundlerWatch::new(events_rx, stop_tx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, RecordingCommandRunner};
    use pretty_assertions::assert_eq;

    fn line(text: &str) -> OutputLine {
        OutputLine::from_raw_bytes(text.as_bytes())
    }

    #[test]
    fn test_classify_build_cycle() {
        let mut parcel = ParcelOutput::new();

        assert_eq!(
            parcel.classify(&line("Building register.ts...")),
            Some(BundlerEvent::BuildStart)
        );
        assert_eq!(parcel.classify(&line("dist/register.js  1.2 KB")), None);
        match parcel.classify(&line("\u{1b}[32m✨  Built in 1.42s.\u{1b}[0m")) {
            Some(BundlerEvent::BuildEnd { duration }) => assert!(duration.is_some()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_classify_error() {
        let mut parcel = ParcelOutput::new();
        assert_eq!(
            parcel.classify(&line("🚨  src/browser/register.ts: Unexpected token")),
            Some(BundlerEvent::BuildError("src/browser/register.ts: Unexpected token".into()))
        );
        assert_eq!(parcel.classify(&line("   ")), None);
    }

    #[tokio::test]
    async fn test_bundle_runs_build_command() {
        let runner = Arc::new(RecordingCommandRunner::new());
        let launcher = Arc::new(FakeLauncher::new());
        let bundler = CommandBundler::new(Path::new("/repo"), runner.clone(), launcher);

        bundler.bundle().await.unwrap();

        let commands = runner.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("parcel build --out-dir dist"));
    }

    #[tokio::test]
    async fn test_watch_forwards_events_and_stops() {
        let launcher = Arc::new(FakeLauncher::new());
        let bundler = CommandBundler::new(
            Path::new("/repo"),
            Arc::new(RecordingCommandRunner::new()),
            launcher.clone(),
        );

        let mut watch = bundler.watch().await.unwrap();
        let mut events = watch.take_events().unwrap();

        let child = launcher.child("parcel").unwrap();
        child.write_stdout("Building vscode.ts...\n✨  Built in 2.01s.\n").await;

        assert_eq!(events.recv().await, Some(BundlerEvent::BuildStart));
        assert!(matches!(events.recv().await, Some(BundlerEvent::BuildEnd { .. })));

        watch.stop().await;
        assert_eq!(launcher.kills(), vec!["parcel".to_string()]);
    }
}
