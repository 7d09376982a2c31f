//! Scripted bundler and platform probe.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::bundler::{Bundler, BundlerEvent, BundlerWatch};
use crate::errors::{BuildError, Result};
use crate::platform::{ProbeOutcome, VersionProbe};

/// A bundler whose watch events are pushed by the test.
#[derive(Debug, Default)]
pub struct FakeBundler {
    bundles: AtomicUsize,
    fail_bundle: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedSender<BundlerEvent>>>,
    watching: AtomicBool,
    stopped: Arc<AtomicBool>,
}

impl FakeBundler {
    /// Creates a bundler that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `bundle()` fail.
    pub fn fail_bundles(&self) {
        self.fail_bundle.store(true, Ordering::SeqCst);
    }

    /// Returns how many production bundles were requested.
    #[must_use]
    pub fn bundle_count(&self) -> usize {
        self.bundles.load(Ordering::SeqCst)
    }

    /// Returns true once `watch()` was called.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    /// Returns true once the watch was stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Delivers a watch event. Returns false if nobody is listening.
    pub fn send(&self, event: BundlerEvent) -> bool {
        self.events
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }
}

#[async_trait]
impl Bundler for FakeBundler {
    async fn bundle(&self) -> Result<()> {
        self.bundles.fetch_add(1, Ordering::SeqCst);
        if self.fail_bundle.load(Ordering::SeqCst) {
            return Err(BuildError::Command(crate::errors::CommandError::new(
                "parcel build",
                Some(1),
                "bundle failed",
            )));
        }
        Ok(())
    }

    async fn watch(&self) -> Result<BundlerWatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock() = Some(tx);
        self.watching.store(true, Ordering::SeqCst);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let stopped = self.stopped.clone();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            stopped.store(true, Ordering::SeqCst);
        });

        Ok(BundlerWatch::new(rx, stop_tx, task))
    }
}

/// A probe returning a fixed outcome and counting its calls.
#[derive(Debug)]
pub struct StaticProbe {
    outcome: ProbeOutcome,
    calls: AtomicUsize,
}

impl StaticProbe {
    /// A probe that ran with the given result.
    #[must_use]
    pub fn completed(code: Option<i32>, stdout: &str, stderr: &str) -> Self {
        Self {
            outcome: ProbeOutcome::Completed {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// A probe that could not be started.
    #[must_use]
    pub fn unavailable(reason: &str) -> Self {
        Self {
            outcome: ProbeOutcome::Unavailable(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of probe runs.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionProbe for StaticProbe {
    async fn probe(&self) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
