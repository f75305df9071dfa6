//! Assertions over persisted pipeline state.

use crate::core::{PipelineId, ProcessableId, Status};
use crate::store::InMemoryPipelineStore;

/// Asserts the persisted status of one processable.
pub fn assert_processable_status(
    store: &InMemoryPipelineStore,
    pipeline_id: PipelineId,
    id: u64,
    expected: Status,
) {
    let actual = store.processable_status(pipeline_id, ProcessableId(id));
    assert_eq!(
        actual,
        Some(expected),
        "Expected processable {id} of pipeline {pipeline_id} to be {expected}, got {actual:?}"
    );
}

/// Asserts the persisted composite status of a pipeline.
pub fn assert_pipeline_status(store: &InMemoryPipelineStore, pipeline_id: PipelineId, expected: Status) {
    let actual = store.get(pipeline_id).map(|p| p.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected pipeline {pipeline_id} to be {expected}, got {actual:?}"
    );
}

/// Asserts the persisted composite status of one stage.
pub fn assert_stage_status(
    store: &InMemoryPipelineStore,
    pipeline_id: PipelineId,
    position: i32,
    expected: Status,
) {
    let actual = store
        .get(pipeline_id)
        .and_then(|p| p.stage_statuses.get(&position).copied());
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage {position} of pipeline {pipeline_id} to be {expected}, got {actual:?}"
    );
}

/// Asserts the persisted generation of a pipeline.
pub fn assert_generation(store: &InMemoryPipelineStore, pipeline_id: PipelineId, expected: u64) {
    let actual = store.generation(pipeline_id);
    assert_eq!(
        actual,
        Some(expected),
        "Expected pipeline {pipeline_id} at generation {expected}, got {actual:?}"
    );
}
