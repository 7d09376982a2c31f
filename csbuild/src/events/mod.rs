//! Event emission for observability.
//!
//! Pipelines and the watch supervisor report their observable side effects
//! (stages starting and finishing, processes spawned and killed, triggers
//! firing) as [`BuildEvent`]s. Production runs log them; tests collect them
//! and assert on their order.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEvent {
    /// Dotted event kind, e.g. `stage.completed` or `process.killed`.
    pub kind: String,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl BuildEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Returns a string field of the payload.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    /// Returns an integer field of the payload.
    #[must_use]
    pub fn field_i64(&self, key: &str) -> Option<i64> {
        self.data.as_ref()?.get(key)?.as_i64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_fields() {
        let event = BuildEvent::new(
            "process.spawned",
            Some(serde_json::json!({"role": "server", "pid": 1234})),
        );

        assert_eq!(event.field_str("role"), Some("server"));
        assert_eq!(event.field_i64("pid"), Some(1234));
        assert_eq!(event.field_str("missing"), None);
    }

    #[test]
    fn test_event_without_data_serializes_compactly() {
        let event = BuildEvent::new("supervisor.started", None);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "supervisor.started");
        assert!(json.get("data").is_none());
    }
}
