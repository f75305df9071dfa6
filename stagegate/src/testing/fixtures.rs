//! Pipeline fixtures.

use std::sync::Arc;

use crate::core::{PipelineId, Processable, Status};
use crate::processing::AtomicPipelineProcessor;
use crate::store::{InMemoryPipelineStore, PipelineSnapshot};

/// Builds a pipeline stage by stage and seeds it into a store.
///
/// Processable ids are assigned sequentially from 1 in the order they are
/// added.
#[derive(Debug, Clone)]
pub struct PipelineFixture {
    pipeline_id: PipelineId,
    processables: Vec<Processable>,
}

impl PipelineFixture {
    /// Creates an empty fixture for `pipeline_id`.
    #[must_use]
    pub fn new(pipeline_id: u64) -> Self {
        Self {
            pipeline_id: PipelineId(pipeline_id),
            processables: Vec::new(),
        }
    }

    fn next_id(&self) -> u64 {
        self.processables.len() as u64 + 1
    }

    /// Adds a `created` processable.
    #[must_use]
    pub fn job(self, name: &str, stage_position: i32) -> Self {
        self.job_with_status(name, stage_position, Status::Created)
    }

    /// Adds a processable with the given status.
    #[must_use]
    pub fn job_with_status(mut self, name: &str, stage_position: i32, status: Status) -> Self {
        let id = self.next_id();
        self.processables
            .push(Processable::new(id, name, stage_position).with_status(status));
        self
    }

    /// Adds a `created` processable that is allowed to fail.
    #[must_use]
    pub fn optional_job(mut self, name: &str, stage_position: i32) -> Self {
        let id = self.next_id();
        self.processables
            .push(Processable::new(id, name, stage_position).allow_failure());
        self
    }

    /// Returns the pipeline id.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Returns the snapshot this fixture describes.
    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot::new(self.pipeline_id, self.processables.clone())
    }

    /// Seeds the pipeline into `store`.
    pub fn seed(&self, store: &InMemoryPipelineStore) {
        store.insert(self.snapshot());
    }

    /// Seeds a fresh store and returns it with a default processor over it.
    #[must_use]
    pub fn build(&self) -> (InMemoryPipelineStore, AtomicPipelineProcessor) {
        let store = InMemoryPipelineStore::new();
        self.seed(&store);
        let processor = AtomicPipelineProcessor::new(Arc::new(store.clone()));
        (store, processor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProcessableId;

    #[test]
    fn test_fixture_assigns_sequential_ids() {
        let fixture = PipelineFixture::new(7)
            .job("build", 0)
            .optional_job("lint", 0)
            .job_with_status("test", 1, Status::Running);

        let snapshot = fixture.snapshot();
        assert_eq!(snapshot.pipeline_id, PipelineId(7));
        assert_eq!(snapshot.processables.len(), 3);
        assert!(snapshot.processable(ProcessableId(2)).unwrap().allowed_to_fail);
        assert_eq!(
            snapshot.processable(ProcessableId(3)).unwrap().status,
            Status::Running
        );
    }

    #[test]
    fn test_build_seeds_store() {
        let (store, _processor) = PipelineFixture::new(1).job("build", 0).build();
        assert_eq!(store.generation(PipelineId(1)), Some(0));
    }
}
