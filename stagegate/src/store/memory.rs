//! In-memory pipeline store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CommitOutcome, CommitRequest, PipelineSnapshot, PipelineStore};
use crate::core::{PipelineId, ProcessableId, Status};
use crate::errors::PersistenceError;

/// Pipelines held in a process-local map.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPipelineStore {
    pipelines: Arc<RwLock<HashMap<PipelineId, PipelineSnapshot>>>,
}

impl InMemoryPipelineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a pipeline.
    pub fn insert(&self, snapshot: PipelineSnapshot) {
        self.pipelines.write().insert(snapshot.pipeline_id, snapshot);
    }

    /// Returns a copy of the persisted pipeline.
    #[must_use]
    pub fn get(&self, pipeline_id: PipelineId) -> Option<PipelineSnapshot> {
        self.pipelines.read().get(&pipeline_id).cloned()
    }

    /// Returns the persisted status of one processable.
    #[must_use]
    pub fn processable_status(&self, pipeline_id: PipelineId, id: ProcessableId) -> Option<Status> {
        self.pipelines
            .read()
            .get(&pipeline_id)
            .and_then(|p| p.processable(id).map(|job| job.status))
    }

    /// Returns the persisted generation of a pipeline.
    #[must_use]
    pub fn generation(&self, pipeline_id: PipelineId) -> Option<u64> {
        self.pipelines.read().get(&pipeline_id).map(|p| p.generation)
    }

    /// Removes a processable, as an unrelated operation deleting a job would.
    ///
    /// Bumps the generation so in-flight cycles see a conflict.
    pub fn remove_processable(&self, pipeline_id: PipelineId, id: ProcessableId) -> bool {
        let mut pipelines = self.pipelines.write();
        let Some(pipeline) = pipelines.get_mut(&pipeline_id) else {
            return false;
        };
        let before = pipeline.processables.len();
        pipeline.processables.retain(|p| p.id != id);
        let removed = pipeline.processables.len() != before;
        if removed {
            pipeline.generation += 1;
        }
        removed
    }

    /// Bumps the generation without other changes, as a foreign writer would.
    pub fn touch(&self, pipeline_id: PipelineId) -> Option<u64> {
        let mut pipelines = self.pipelines.write();
        let pipeline = pipelines.get_mut(&pipeline_id)?;
        pipeline.generation += 1;
        Some(pipeline.generation)
    }

    /// Returns the number of pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.read().len()
    }

    /// Returns true if the store holds no pipelines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.read().is_empty()
    }
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn load(&self, pipeline_id: PipelineId) -> Result<Option<PipelineSnapshot>, PersistenceError> {
        Ok(self.get(pipeline_id))
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, PersistenceError> {
        let mut pipelines = self.pipelines.write();
        let pipeline = pipelines.get_mut(&request.pipeline_id).ok_or_else(|| {
            PersistenceError::new(format!("pipeline {} vanished", request.pipeline_id))
        })?;

        if pipeline.generation != request.expected_generation {
            return Ok(CommitOutcome::Conflict {
                current_generation: pipeline.generation,
            });
        }

        // Validate everything before mutating anything.
        let mut positions = HashMap::with_capacity(request.processable_updates.len());
        for id in request.processable_updates.keys() {
            let index = pipeline
                .processables
                .iter()
                .position(|p| p.id == *id)
                .ok_or_else(|| PersistenceError::new(format!("processable {id} vanished")))?;
            positions.insert(*id, index);
        }

        for (id, entry) in &request.processable_updates {
            if let Some(&index) = positions.get(id) {
                let job = &mut pipeline.processables[index];
                job.status = entry.status;
                job.allowed_to_fail = entry.allowed_to_fail;
            }
        }
        pipeline.status = request.pipeline_status;
        pipeline.stage_statuses = request.stage_statuses;
        pipeline.generation += 1;

        Ok(CommitOutcome::Committed {
            generation: pipeline.generation,
        })
    }
}
