//! Inbound triggers and outbound processing results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{PipelineId, ProcessableId, Status};

/// "Processable X now has status Y": the event that starts a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// The processable that changed.
    pub processable_id: ProcessableId,
    /// Its new status.
    pub new_status: Status,
    /// Its `allowed_to_fail` flag.
    #[serde(default)]
    pub allowed_to_fail: bool,
}

impl Trigger {
    /// Creates a trigger for a processable that is not allowed to fail.
    #[must_use]
    pub const fn new(processable_id: ProcessableId, new_status: Status) -> Self {
        Self {
            processable_id,
            new_status,
            allowed_to_fail: false,
        }
    }

    /// Sets the `allowed_to_fail` flag.
    #[must_use]
    pub const fn with_allowed_to_fail(mut self, allowed_to_fail: bool) -> Self {
        self.allowed_to_fail = allowed_to_fail;
        self
    }
}

/// A trigger addressed to a pipeline, as delivered by the job subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// The pipeline to process.
    pub pipeline_id: PipelineId,
    /// What changed.
    #[serde(flatten)]
    pub trigger: Trigger,
}

impl TriggerEvent {
    /// Creates a new event.
    #[must_use]
    pub const fn new(pipeline_id: PipelineId, trigger: Trigger) -> Self {
        Self {
            pipeline_id,
            trigger,
        }
    }
}

/// Outcome of one committed (or no-op) cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Composite status of the whole pipeline.
    pub pipeline_status: Status,
    /// Processables that became `pending`; hand these to the dispatcher.
    pub unblocked: Vec<ProcessableId>,
    /// Processables that became `skipped`; report these to users.
    pub newly_skipped: Vec<ProcessableId>,
    /// Composite status of each stage, by position.
    pub stage_statuses: BTreeMap<i32, Status>,
    /// Whether anything was committed.
    pub updated: bool,
    /// Pipeline generation after the cycle.
    pub generation: u64,
    /// Cycles run, including the successful one.
    pub attempts: usize,
    /// Processables still `created`, `pending` or `running` after the cycle.
    pub outstanding: usize,
}

impl ProcessingResult {
    /// Returns true if the cycle unblocked or skipped anything.
    #[must_use]
    pub fn has_transitions(&self) -> bool {
        !self.unblocked.is_empty() || !self.newly_skipped.is_empty()
    }
}
