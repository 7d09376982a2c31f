//! Event sink trait and implementations.

use super::BuildEvent;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Trait for sinks that receive build and supervisor events.
///
/// Emission never blocks and never fails; sinks that can error must log and
/// swallow the failure themselves.
pub trait EventSink: Send + Sync {
    /// Records an event.
    fn emit(&self, event: BuildEvent);

    /// Convenience wrapper building the event in place.
    fn emit_kind(&self, kind: &str, data: Option<serde_json::Value>) {
        self.emit(BuildEvent::new(kind, data));
    }
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: BuildEvent) {}
}

/// A sink that forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: BuildEvent) {
        if self.level == Level::INFO {
            info!(
                event_kind = %event.kind,
                event_data = ?event.data,
                timestamp = %event.timestamp,
                "Event: {}", event.kind
            );
        } else {
            debug!(
                event_kind = %event.kind,
                event_data = ?event.data,
                timestamp = %event.timestamp,
                "Event: {}", event.kind
            );
        }
    }
}

/// A sink that keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<BuildEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.read().clone()
    }

    /// Returns the kinds of all collected events, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.kind.clone()).collect()
    }

    /// Returns events whose kind starts with the prefix.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<BuildEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: BuildEvent) {
        self.events.write().push(event);
    }
}
