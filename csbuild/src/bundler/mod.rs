//! Browser asset bundler adapter.
//!
//! The bundler runs once for production builds and in watch mode during
//! development. In watch mode its progress is reported as a stream of
//! [`BundlerEvent`]s that the supervisor uses to defer server restarts while
//! a bundle is being built.

mod command;

pub use command::{CommandBundler, ParcelOutput};

use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Progress of a watching bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundlerEvent {
    /// A rebuild started.
    BuildStart,
    /// A rebuild finished.
    BuildEnd {
        /// Time the rebuild took, when known.
        duration: Option<Duration>,
    },
    /// A rebuild failed.
    BuildError(String),
}

/// Whether the bundler is currently producing a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStatus {
    /// A bundle is being built.
    Building,
    /// No bundle is being built.
    Idle,
}

impl BundleStatus {
    /// Returns the status after the given event.
    #[must_use]
    pub fn after(event: &BundlerEvent) -> Self {
        match event {
            BundlerEvent::BuildStart => Self::Building,
            BundlerEvent::BuildEnd { .. } | BundlerEvent::BuildError(_) => Self::Idle,
        }
    }
}

/// A running bundler watch.
///
/// Events arrive on the receiver returned by [`BundlerWatch::take_events`].
/// [`BundlerWatch::stop`] ends the watch and waits for it to wind down.
#[derive(Debug)]
pub struct BundlerWatch {
    events: Option<mpsc::UnboundedReceiver<BundlerEvent>>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BundlerWatch {
    /// Creates a watch from its event receiver, its stop channel and the
    /// task that reacts to the stop request.
    #[must_use]
    pub fn new(
        events: mpsc::UnboundedReceiver<BundlerEvent>,
        stop_tx: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events: Some(events),
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Takes the event receiver. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<BundlerEvent>> {
        self.events.take()
    }

    /// Stops the watch. Later calls do nothing.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Seam for the asset bundler.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Produces a production bundle and waits for it.
    async fn bundle(&self) -> Result<()>;

    /// Starts watch mode. Does not wait for the first bundle.
    async fn watch(&self) -> Result<BundlerWatch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_after_events() {
        assert_eq!(BundleStatus::after(&BundlerEvent::BuildStart), BundleStatus::Building);
        assert_eq!(
            BundleStatus::after(&BundlerEvent::BuildEnd { duration: None }),
            BundleStatus::Idle
        );
        assert_eq!(
            BundleStatus::after(&BundlerEvent::BuildError("boom".into())),
            BundleStatus::Idle
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
        });
        let mut watch = BundlerWatch::new(rx, stop_tx, task);

        assert!(watch.take_events().is_some());
        assert!(watch.take_events().is_none());
        watch.stop().await;
        watch.stop().await;
    }
}
