//! End-to-end processing cycles against the in-memory store.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;
use crate::core::{PipelineId, ProcessableId, Status};
use crate::errors::StagegateError;
use crate::events::{self, CollectingEventSink};
use crate::locking::{InMemoryPipelineLocks, PipelineLocks};
use crate::store::{InMemoryPipelineStore, PipelineSnapshot};
use crate::testing::{
    assert_generation, assert_pipeline_status, assert_processable_status, assert_stage_status,
    FailingStore, InterferingStore, LockstepStore, PipelineFixture,
};

const P: PipelineId = PipelineId(1);

fn ids(raw: &[u64]) -> Vec<ProcessableId> {
    raw.iter().copied().map(ProcessableId).collect()
}

fn trigger(id: u64, status: Status) -> Trigger {
    Trigger::new(ProcessableId(id), status)
}

fn fast_retry(max_attempts: usize) -> ProcessorConfig {
    ProcessorConfig::default().with_conflict_retry(
        RetryConfig::default()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(1)
            .with_max_delay_ms(5),
    )
}

fn three_stages() -> PipelineFixture {
    PipelineFixture::new(1)
        .job("build", 0)
        .job("test", 1)
        .job("deploy", 2)
}

#[tokio::test]
async fn test_fresh_pipeline_unblocks_first_stage() {
    let (store, processor) = three_stages().build();

    let result = processor.process_pipeline(P).await.unwrap();

    assert_eq!(result.unblocked, ids(&[1]));
    assert!(result.newly_skipped.is_empty());
    assert_eq!(result.pipeline_status, Status::Pending);
    assert!(result.updated);
    assert_eq!(result.generation, 1);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.outstanding, 3);

    assert_processable_status(&store, P, 1, Status::Pending);
    assert_processable_status(&store, P, 2, Status::Created);
    assert_pipeline_status(&store, P, Status::Pending);
    assert_stage_status(&store, P, 0, Status::Pending);
    assert_stage_status(&store, P, 1, Status::Created);
}

#[tokio::test]
async fn test_success_unblocks_next_stage_only() {
    let (store, processor) = three_stages().build();
    processor.process_pipeline(P).await.unwrap();

    let result = processor.process(P, trigger(1, Status::Success)).await.unwrap();

    assert_eq!(result.unblocked, ids(&[2]));
    assert_eq!(result.pipeline_status, Status::Pending);
    assert_processable_status(&store, P, 1, Status::Success);
    assert_processable_status(&store, P, 2, Status::Pending);
    assert_processable_status(&store, P, 3, Status::Created);
    assert_stage_status(&store, P, 0, Status::Success);
}

#[tokio::test]
async fn test_failure_skips_downstream_and_fails_pipeline() {
    let (store, processor) = three_stages().build();
    processor.process_pipeline(P).await.unwrap();
    processor.process(P, trigger(1, Status::Success)).await.unwrap();

    let result = processor.process(P, trigger(2, Status::Failed)).await.unwrap();

    assert_eq!(result.newly_skipped, ids(&[3]));
    assert!(result.unblocked.is_empty());
    assert_eq!(result.pipeline_status, Status::Failed);
    assert_eq!(result.stage_statuses[&1], Status::Failed);
    assert_eq!(result.stage_statuses[&2], Status::Skipped);
    assert_eq!(result.outstanding, 0);

    assert_processable_status(&store, P, 3, Status::Skipped);
    assert_pipeline_status(&store, P, Status::Failed);
}

#[tokio::test]
async fn test_cancel_skips_downstream() {
    let fixture = PipelineFixture::new(1)
        .job_with_status("build", 0, Status::Success)
        .job_with_status("test", 1, Status::Running)
        .job("deploy", 2);
    let (store, processor) = fixture.build();

    let result = processor.process(P, trigger(2, Status::Canceled)).await.unwrap();

    assert_eq!(result.newly_skipped, ids(&[3]));
    assert_eq!(result.pipeline_status, Status::Canceled);
    assert_pipeline_status(&store, P, Status::Canceled);
}

#[tokio::test]
async fn test_allowed_failure_does_not_block() {
    let fixture = PipelineFixture::new(1)
        .job_with_status("build", 0, Status::Success)
        .job_with_status("lint", 0, Status::Running)
        .job("deploy", 1);
    let (store, processor) = fixture.build();

    let lint_failed = trigger(2, Status::Failed).with_allowed_to_fail(true);
    let result = processor.process(P, lint_failed).await.unwrap();

    assert_eq!(result.unblocked, ids(&[3]));
    assert_eq!(result.stage_statuses[&0], Status::Success);
    assert!(store.get(P).unwrap().processable(ProcessableId(2)).unwrap().allowed_to_fail);

    let result = processor.process(P, trigger(3, Status::Success)).await.unwrap();
    assert_eq!(result.pipeline_status, Status::Success);
    assert_pipeline_status(&store, P, Status::Success);
}

#[tokio::test]
async fn test_repeated_trigger_is_a_no_op() {
    let (store, processor) = three_stages().build();
    processor.process_pipeline(P).await.unwrap();
    processor.process(P, trigger(1, Status::Failed)).await.unwrap();
    assert_generation(&store, P, 2);

    let result = processor.process(P, trigger(1, Status::Failed)).await.unwrap();

    assert!(!result.updated);
    assert!(!result.has_transitions());
    assert_eq!(result.pipeline_status, Status::Failed);
    assert_eq!(result.generation, 2);
    assert_generation(&store, P, 2);
}

#[tokio::test]
async fn test_missing_pipeline_is_not_found() {
    let (_store, processor) = three_stages().build();

    let err = processor
        .process(PipelineId(99), trigger(1, Status::Success))
        .await
        .unwrap_err();

    assert!(matches!(err, StagegateError::PipelineNotFound(e) if e.pipeline_id == PipelineId(99)));
}

#[tokio::test]
async fn test_pipeline_without_processables_is_an_empty_set() {
    let store = InMemoryPipelineStore::new();
    store.insert(PipelineSnapshot::new(P, Vec::new()));
    let processor = AtomicPipelineProcessor::new(Arc::new(store.clone()));

    let err = processor.process_pipeline(P).await.unwrap_err();

    assert!(matches!(err, StagegateError::EmptySet(_)));
    assert_generation(&store, P, 0);
}

#[tokio::test]
async fn test_unknown_processable_is_ignored() {
    let (store, processor) = three_stages().build();

    let result = processor.process(P, trigger(42, Status::Success)).await.unwrap();

    // The rest of the cycle still runs.
    assert_eq!(result.unblocked, ids(&[1]));
    assert_eq!(store.get(P).unwrap().processables.len(), 3);
}

#[tokio::test]
async fn test_terminal_processable_is_not_reopened() {
    let fixture = PipelineFixture::new(1)
        .job_with_status("build", 0, Status::Success)
        .job("test", 1);
    let (store, processor) = fixture.build();

    let result = processor.process(P, trigger(1, Status::Running)).await.unwrap();

    assert_processable_status(&store, P, 1, Status::Success);
    assert_eq!(result.unblocked, ids(&[2]));
}

#[tokio::test]
async fn test_conflict_is_retried_from_fresh_state() {
    let inner = InMemoryPipelineStore::new();
    three_stages().seed(&inner);
    let store = Arc::new(InterferingStore::new(inner.clone(), 1));
    let processor = AtomicPipelineProcessor::new(store.clone())
        .with_config(fast_retry(5))
        .unwrap();

    let result = processor.process_pipeline(P).await.unwrap();

    assert_eq!(result.attempts, 2);
    assert_eq!(result.unblocked, ids(&[1]));
    assert_eq!(store.commit_calls(), 2);
    // One foreign bump plus our commit.
    assert_eq!(result.generation, 2);
    assert_processable_status(&inner, P, 1, Status::Pending);
}

#[tokio::test]
async fn test_conflict_retries_exhausted() {
    let inner = InMemoryPipelineStore::new();
    three_stages().seed(&inner);
    let store = Arc::new(InterferingStore::new(inner.clone(), usize::MAX));
    let sink = Arc::new(CollectingEventSink::new());
    let processor = AtomicPipelineProcessor::new(store.clone())
        .with_config(fast_retry(3))
        .unwrap()
        .with_event_sink(sink.clone());

    let err = processor.process_pipeline(P).await.unwrap_err();

    match err {
        StagegateError::ProcessingConflict(e) => {
            assert_eq!(e.pipeline_id, P);
            assert_eq!(e.attempts, 3);
        }
        other => panic!("expected a processing conflict, got {other:?}"),
    }
    assert!(failed_event_is_retryable(&sink));
    assert_eq!(store.commit_calls(), 3);
    assert_eq!(sink.payloads_of(events::PIPELINE_CONFLICT_RETRY).len(), 2);
    assert_processable_status(&inner, P, 1, Status::Created);
}

fn failed_event_is_retryable(sink: &CollectingEventSink) -> bool {
    sink.payloads_of(events::PIPELINE_FAILED)
        .first()
        .is_some_and(|payload| payload["retryable"] == true)
}

#[tokio::test]
async fn test_lease_timeout_reports_unavailable() {
    let (store, processor) = three_stages().build();
    let locks = InMemoryPipelineLocks::new();
    let sink = Arc::new(CollectingEventSink::new());
    let processor = processor
        .with_locks(Arc::new(locks.clone()))
        .with_event_sink(sink.clone())
        .with_config(ProcessorConfig::default().with_lock_timeout_ms(20))
        .unwrap();

    let held = locks
        .acquire(P, std::time::Duration::from_secs(1))
        .await
        .unwrap();

    let err = processor.process_pipeline(P).await.unwrap_err();
    assert!(matches!(err, StagegateError::LeaseUnavailable(ref e) if e.waited_ms == 20));
    assert!(err.is_retryable());
    assert_eq!(sink.payloads_of(events::PIPELINE_LEASE_UNAVAILABLE).len(), 1);
    assert_generation(&store, P, 0);

    drop(held);
    let result = processor.process_pipeline(P).await.unwrap();
    assert_eq!(result.unblocked, ids(&[1]));
}

#[tokio::test]
async fn test_persistence_failure_writes_nothing() {
    let inner = InMemoryPipelineStore::new();
    three_stages().seed(&inner);
    let store = Arc::new(FailingStore::new(inner.clone(), "connection reset"));
    let processor = AtomicPipelineProcessor::new(store.clone());

    let err = processor.process_pipeline(P).await.unwrap_err();

    assert!(matches!(err, StagegateError::Persistence(ref e) if e.message == "connection reset"));
    assert_eq!(store.attempted().len(), 1);
    assert_generation(&inner, P, 0);
    assert_processable_status(&inner, P, 1, Status::Created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_are_both_applied() {
    let fixture = PipelineFixture::new(1)
        .job_with_status("linux", 0, Status::Running)
        .job_with_status("mac", 0, Status::Running)
        .job("deploy", 1);
    let (store, processor) = fixture.build();
    let processor = Arc::new(processor);

    let first = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.process(P, trigger(1, Status::Success)).await })
    };
    let second = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.process(P, trigger(2, Status::Success)).await })
    };
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    // Exactly one of the two cycles saw both successes.
    let mut unblocked: Vec<_> = first.unblocked.into_iter().chain(second.unblocked).collect();
    unblocked.sort();
    assert_eq!(unblocked, ids(&[3]));

    assert_processable_status(&store, P, 1, Status::Success);
    assert_processable_status(&store, P, 2, Status::Success);
    assert_processable_status(&store, P, 3, Status::Pending);
    assert_generation(&store, P, 2);
}

#[tokio::test]
async fn test_redelivered_terminal_trigger_cannot_change_the_flag() {
    let fixture = PipelineFixture::new(1)
        .job_with_status("build", 0, Status::Running)
        .job("deploy", 1);
    let (store, processor) = fixture.build();

    let result = processor.process(P, trigger(1, Status::Failed)).await.unwrap();
    assert_eq!(result.newly_skipped, ids(&[2]));
    assert_eq!(result.pipeline_status, Status::Failed);
    let generation = result.generation;

    let redelivered = trigger(1, Status::Failed).with_allowed_to_fail(true);
    let result = processor.process(P, redelivered).await.unwrap();

    assert!(!result.updated);
    assert_eq!(result.pipeline_status, Status::Failed);
    assert_eq!(result.stage_statuses[&0], Status::Failed);
    assert!(!store.get(P).unwrap().processable(ProcessableId(1)).unwrap().allowed_to_fail);
    assert_pipeline_status(&store, P, Status::Failed);
    assert_generation(&store, P, generation);
}

#[tokio::test]
async fn test_terminal_processable_ignores_a_different_status() {
    let fixture = PipelineFixture::new(1)
        .job_with_status("build", 0, Status::Failed)
        .job_with_status("deploy", 1, Status::Skipped);
    let (store, processor) = fixture.build();
    processor.process_pipeline(P).await.unwrap();

    let result = processor.process(P, trigger(1, Status::Success)).await.unwrap();

    assert!(!result.updated);
    assert_processable_status(&store, P, 1, Status::Failed);
    assert_pipeline_status(&store, P, Status::Failed);
}

#[tokio::test]
async fn test_with_config_rejects_invalid_config() {
    let (_store, processor) = three_stages().build();

    let config = ProcessorConfig::default()
        .with_conflict_retry(RetryConfig::default().with_max_attempts(0));
    let err = processor.with_config(config).err().unwrap();

    assert!(matches!(err, StagegateError::Config(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_workers_resolve_through_generation_retry() {
    let inner = InMemoryPipelineStore::new();
    PipelineFixture::new(1)
        .job_with_status("linux", 0, Status::Running)
        .job_with_status("mac", 0, Status::Running)
        .job("deploy", 1)
        .seed(&inner);
    // Both cycles read generation 0 before either commits.
    let store = Arc::new(LockstepStore::new(inner.clone(), 2));

    // Separate processors own separate lock tables, like two workers.
    let worker = |id: u64| {
        let processor = AtomicPipelineProcessor::new(store.clone())
            .with_config(fast_retry(5))
            .unwrap();
        tokio::spawn(async move { processor.process(P, trigger(id, Status::Success)).await })
    };
    let first = worker(1);
    let second = worker(2);
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    let mut attempts = vec![first.attempts, second.attempts];
    attempts.sort_unstable();
    assert_eq!(attempts, vec![1, 2]);

    let mut unblocked: Vec<_> = first.unblocked.into_iter().chain(second.unblocked).collect();
    unblocked.sort();
    assert_eq!(unblocked, ids(&[3]));

    assert_processable_status(&inner, P, 1, Status::Success);
    assert_processable_status(&inner, P, 2, Status::Success);
    assert_processable_status(&inner, P, 3, Status::Pending);
    assert_generation(&inner, P, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_without_shared_locks_never_lose_updates() {
    for _ in 0..20 {
        let store = InMemoryPipelineStore::new();
        PipelineFixture::new(1)
            .job_with_status("linux", 0, Status::Running)
            .job_with_status("mac", 0, Status::Running)
            .job("deploy", 1)
            .seed(&store);

        let worker = |id: u64| {
            let processor = AtomicPipelineProcessor::new(Arc::new(store.clone()))
                .with_config(fast_retry(10))
                .unwrap();
            tokio::spawn(async move { processor.process(P, trigger(id, Status::Success)).await })
        };
        let first = worker(1);
        let second = worker(2);
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_processable_status(&store, P, 1, Status::Success);
        assert_processable_status(&store, P, 2, Status::Success);
        assert_processable_status(&store, P, 3, Status::Pending);
    }
}

#[tokio::test]
async fn test_batch_keeps_input_order() {
    let store = InMemoryPipelineStore::new();
    PipelineFixture::new(1)
        .job_with_status("build", 0, Status::Running)
        .job("test", 1)
        .job("deploy", 2)
        .seed(&store);
    PipelineFixture::new(2)
        .job_with_status("build", 0, Status::Running)
        .job("test", 1)
        .seed(&store);
    let processor = AtomicPipelineProcessor::new(Arc::new(store.clone()));

    let results = processor
        .process_batch(vec![
            TriggerEvent::new(P, trigger(1, Status::Success)),
            TriggerEvent::new(PipelineId(2), trigger(1, Status::Failed)),
            TriggerEvent::new(P, trigger(2, Status::Success)),
            TriggerEvent::new(PipelineId(3), trigger(1, Status::Success)),
        ])
        .await;

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].as_ref().unwrap().unblocked, ids(&[2]));
    assert_eq!(results[1].as_ref().unwrap().newly_skipped, ids(&[2]));
    assert_eq!(results[2].as_ref().unwrap().unblocked, ids(&[3]));
    assert!(matches!(results[3], Err(StagegateError::PipelineNotFound(_))));

    assert_pipeline_status(&store, PipelineId(2), Status::Failed);
}

#[tokio::test]
async fn test_events_describe_the_cycle() {
    let (_store, processor) = three_stages().build();
    let sink = Arc::new(CollectingEventSink::new());
    let processor = processor.with_event_sink(sink.clone());

    processor.process_pipeline(P).await.unwrap();

    let unblocked = sink.payloads_of(events::PROCESSABLE_UNBLOCKED);
    assert_eq!(unblocked.len(), 1);
    assert_eq!(unblocked[0]["processable_id"], 1);
    assert_eq!(unblocked[0]["pipeline_id"], 1);

    let processed = sink.payloads_of(events::PIPELINE_PROCESSED);
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0]["status"], "pending");
    assert_eq!(processed[0]["generation"], 1);
    assert_eq!(processed[0]["updated"], true);
    assert_eq!(processed[0]["outstanding"], 3);
    assert!(processed[0]["timestamp"].is_string());
    assert!(sink.payloads_of(events::PIPELINE_FAILED).is_empty());
}
