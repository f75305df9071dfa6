//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Trait for sinks that receive processing events.
///
/// Sinks are handed to the processor explicitly; there is no ambient
/// global sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The type of event (e.g., "pipeline.processed")
    /// * `data` - Event payload
    async fn emit(&self, event_type: &str, data: serde_json::Value);

    /// Emits an event without awaiting.
    ///
    /// Must never fail; sinks log and swallow their own errors.
    fn try_emit(&self, event_type: &str, data: serde_json::Value);
}

/// A sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: serde_json::Value) {}

    fn try_emit(&self, _event_type: &str, _data: serde_json::Value) {}
}

/// A sink that turns processing events into log lines.
///
/// The pipeline id from the payload is lifted into its own field so log
/// queries can filter on it.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LoggingEventSink {
    /// Logs at `level`; anything more verbose than `info` logs at `debug`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs at `debug`.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: &serde_json::Value) {
        let pipeline_id = data.get("pipeline_id").and_then(serde_json::Value::as_u64);
        if self.level > Level::INFO {
            debug!(event_type, pipeline_id, payload = %data, "Pipeline event");
        } else {
            info!(event_type, pipeline_id, payload = %data, "Pipeline event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.log_event(event_type, &data);
    }

    fn try_emit(&self, event_type: &str, data: serde_json::Value) {
        self.log_event(event_type, &data);
    }
}

/// A sink that keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, serde_json::Value)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the payloads of events with exactly this type.
    #[must_use]
    pub fn payloads_of(&self, event_type: &str) -> Vec<serde_json::Value> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .map(|(_, data)| data.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.events.write().push((event_type.to_string(), data));
    }

    fn try_emit(&self, event_type: &str, data: serde_json::Value) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit("pipeline.processed", json!({})).await;
        sink.try_emit("pipeline.processed", json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::debug();
        sink.emit("processable.unblocked", json!({"processable_id": 3})).await;
        sink.try_emit("processable.skipped", json!({}));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("processable.unblocked", json!({"processable_id": 1})).await;
        sink.try_emit("processable.unblocked", json!({"processable_id": 2}));
        sink.emit("pipeline.processed", json!({"status": "running"})).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events()[2].0, "pipeline.processed");

        let unblocked = sink.payloads_of("processable.unblocked");
        assert_eq!(unblocked.len(), 2);
        assert_eq!(unblocked[1]["processable_id"], 2);

        sink.clear();
        assert!(sink.is_empty());
    }
}
