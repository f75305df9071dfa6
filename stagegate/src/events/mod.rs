//! Processing events.
//!
//! The processor reports what each cycle did through an [`EventSink`]:
//! which processables to dispatch, which were skipped, conflicts and lease
//! timeouts. Payloads are JSON objects stamped with an RFC 3339 timestamp.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::core::PipelineId;

/// A cycle finished (committed or no-op).
pub const PIPELINE_PROCESSED: &str = "pipeline.processed";
/// A cycle failed with an error.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// A cycle lost the generation race and will run again.
pub const PIPELINE_CONFLICT_RETRY: &str = "pipeline.conflict_retry";
/// The pipeline lease could not be obtained in time.
pub const PIPELINE_LEASE_UNAVAILABLE: &str = "pipeline.lease_unavailable";
/// A processable became `pending`.
pub const PROCESSABLE_UNBLOCKED: &str = "processable.unblocked";
/// A processable became `skipped`.
pub const PROCESSABLE_SKIPPED: &str = "processable.skipped";

/// Builds an event payload for `pipeline_id`, merging `fields` into it.
#[must_use]
pub fn event_payload(pipeline_id: PipelineId, fields: Value) -> Value {
    let mut payload = json!({
        "pipeline_id": pipeline_id,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), fields) {
        target.extend(extra);
    }
    payload
}
