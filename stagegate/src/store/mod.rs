//! Persistence contract for pipelines and their processables.
//!
//! The engine needs two operations from storage: one bulk read of a whole
//! pipeline, and one all-or-nothing commit guarded by the pipeline's
//! `generation`. Any transactional backend can implement [`PipelineStore`].

mod memory;

pub use memory::InMemoryPipelineStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{PipelineId, Processable, ProcessableId, Status, StatusEntry};
use crate::errors::PersistenceError;

/// Everything persisted for one pipeline, read in a single round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    /// The pipeline.
    pub pipeline_id: PipelineId,
    /// Cached composite status.
    pub status: Status,
    /// Optimistic concurrency counter.
    pub generation: u64,
    /// Cached stage composites, keyed by position.
    #[serde(default)]
    pub stage_statuses: BTreeMap<i32, Status>,
    /// All processables of the pipeline.
    pub processables: Vec<Processable>,
}

impl PipelineSnapshot {
    /// Creates a snapshot of a freshly created pipeline at generation 0.
    #[must_use]
    pub fn new(pipeline_id: PipelineId, processables: Vec<Processable>) -> Self {
        Self {
            pipeline_id,
            status: Status::Created,
            generation: 0,
            stage_statuses: BTreeMap::new(),
            processables,
        }
    }

    /// Looks up a processable by id.
    #[must_use]
    pub fn processable(&self, id: ProcessableId) -> Option<&Processable> {
        self.processables.iter().find(|p| p.id == id)
    }
}

/// The delta produced by one processing cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    /// The pipeline being written.
    pub pipeline_id: PipelineId,
    /// Generation the cycle was computed against.
    pub expected_generation: u64,
    /// New `(status, allowed_to_fail)` for changed processables.
    pub processable_updates: BTreeMap<ProcessableId, StatusEntry>,
    /// New composite pipeline status.
    pub pipeline_status: Status,
    /// New stage composites.
    pub stage_statuses: BTreeMap<i32, Status>,
}

/// Result of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The delta was written; the pipeline is now at `generation`.
    Committed {
        /// Generation after the commit.
        generation: u64,
    },
    /// Another writer committed first; nothing was written.
    Conflict {
        /// Generation currently persisted.
        current_generation: u64,
    },
}

/// Storage backend for pipelines.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Reads the pipeline and all of its processables, or `None` if the
    /// pipeline does not exist.
    async fn load(&self, pipeline_id: PipelineId) -> Result<Option<PipelineSnapshot>, PersistenceError>;

    /// Applies `request` atomically if the persisted generation still equals
    /// `request.expected_generation`, incrementing it.
    async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, PersistenceError>;
}
