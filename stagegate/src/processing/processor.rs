//! The atomic pipeline processor.

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::propagation::{propagate, Propagation};
use super::retry::{RetryDecision, RetryState};
use super::{ProcessingResult, ProcessorConfig, Trigger, TriggerEvent};
use crate::collection::StatusCollection;
use crate::core::{PipelineId, Processable, StatusEntry};
use crate::errors::{ProcessingConflictError, StagegateError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::locking::{InMemoryPipelineLocks, PipelineLease, PipelineLocks};
use crate::observability::SpanTimer;
use crate::store::{CommitOutcome, CommitRequest, PipelineStore};

/// What a single cycle ended with.
enum CycleOutcome {
    Done(ProcessingResult),
    Conflict { current_generation: u64 },
}

/// Single entry point for status changes.
///
/// Each call runs one recomputation cycle under the pipeline's lease:
/// load, apply the trigger, propagate stage by stage, and commit the delta
/// against the generation that was loaded. A cycle that loses the
/// generation race is discarded and rerun from a fresh load.
pub struct AtomicPipelineProcessor {
    store: Arc<dyn PipelineStore>,
    locks: Arc<dyn PipelineLocks>,
    events: Arc<dyn EventSink>,
    config: ProcessorConfig,
}

impl AtomicPipelineProcessor {
    /// Creates a processor with process-local leases, no event sink and the
    /// default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self {
            store,
            locks: Arc::new(InMemoryPipelineLocks::new()),
            events: Arc::new(NoOpEventSink),
            config: ProcessorConfig::default(),
        }
    }

    /// Sets the lease provider.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<dyn PipelineLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the configuration after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`StagegateError::Config`] if `config` fails
    /// [`ProcessorConfig::validate`].
    pub fn with_config(mut self, config: ProcessorConfig) -> Result<Self, StagegateError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Applies `trigger` to the pipeline and propagates the consequences.
    ///
    /// # Errors
    ///
    /// - [`StagegateError::PipelineNotFound`] if the pipeline does not exist
    /// - [`StagegateError::LeaseUnavailable`] if the lease wait timed out;
    ///   re-enqueue the trigger
    /// - [`StagegateError::ProcessingConflict`] if the retry budget ran out;
    ///   re-enqueue the trigger
    /// - [`StagegateError::Persistence`] if the store failed; nothing was
    ///   written
    /// - [`StagegateError::EmptySet`] if the pipeline has no processables
    pub async fn process(
        &self,
        pipeline_id: PipelineId,
        trigger: Trigger,
    ) -> Result<ProcessingResult, StagegateError> {
        self.run(pipeline_id, Some(trigger)).await
    }

    /// Runs one cycle without a trigger, e.g. right after the pipeline was
    /// created to unblock its first stage.
    ///
    /// # Errors
    ///
    /// Same as [`process`](Self::process).
    pub async fn process_pipeline(
        &self,
        pipeline_id: PipelineId,
    ) -> Result<ProcessingResult, StagegateError> {
        self.run(pipeline_id, None).await
    }

    /// Processes many triggers.
    ///
    /// Pipelines are processed concurrently with each other; triggers for
    /// the same pipeline run one after another in submission order. Results
    /// come back in input order.
    pub async fn process_batch(
        &self,
        batch: Vec<TriggerEvent>,
    ) -> Vec<Result<ProcessingResult, StagegateError>> {
        let total = batch.len();
        let mut groups: BTreeMap<PipelineId, Vec<(usize, Trigger)>> = BTreeMap::new();
        for (index, event) in batch.into_iter().enumerate() {
            groups
                .entry(event.pipeline_id)
                .or_default()
                .push((index, event.trigger));
        }

        let mut runs: FuturesUnordered<_> = groups
            .into_iter()
            .map(|(pipeline_id, triggers)| async move {
                let mut results = Vec::with_capacity(triggers.len());
                for (index, trigger) in triggers {
                    results.push((index, self.process(pipeline_id, trigger).await));
                }
                results
            })
            .collect();

        let mut slots: Vec<Option<Result<ProcessingResult, StagegateError>>> =
            (0..total).map(|_| None).collect();
        while let Some(results) = runs.next().await {
            for (index, result) in results {
                slots[index] = Some(result);
            }
        }
        slots.into_iter().flatten().collect()
    }

    async fn run(
        &self,
        pipeline_id: PipelineId,
        trigger: Option<Trigger>,
    ) -> Result<ProcessingResult, StagegateError> {
        let cycle_id = Uuid::now_v7();
        let span = tracing::info_span!(
            "process_pipeline",
            pipeline_id = %pipeline_id,
            cycle_id = %cycle_id,
            processable_id = trigger.map(|t| t.processable_id.0),
        );

        async move {
            let timer = SpanTimer::start("process_pipeline");
            let result = self.run_with_retry(pipeline_id, trigger.as_ref()).await;

            match &result {
                Ok(result) => {
                    tracing::debug!(
                        status = %result.pipeline_status,
                        unblocked = result.unblocked.len(),
                        skipped = result.newly_skipped.len(),
                        updated = result.updated,
                        outstanding = result.outstanding,
                        "Processed pipeline"
                    );
                    self.emit_processed(pipeline_id, cycle_id, result, timer.elapsed_ms())
                        .await;
                }
                Err(err) => {
                    let mut data = err.to_event_data();
                    data["cycle_id"] = json!(cycle_id.to_string());
                    self.events
                        .emit(events::PIPELINE_FAILED, events::event_payload(pipeline_id, data))
                        .await;
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_with_retry(
        &self,
        pipeline_id: PipelineId,
        trigger: Option<&Trigger>,
    ) -> Result<ProcessingResult, StagegateError> {
        let mut retry = RetryState::new();

        loop {
            let attempt = retry.failures() + 1;
            let lease = self.acquire(pipeline_id).await?;
            let cycle = self.run_cycle(pipeline_id, trigger).await;
            drop(lease);

            match cycle? {
                CycleOutcome::Done(mut result) => {
                    result.attempts = attempt;
                    return Ok(result);
                }
                CycleOutcome::Conflict { current_generation } => {
                    match retry.record_failure(&self.config.conflict_retry) {
                        RetryDecision::Retry(delay) => {
                            tracing::debug!(
                                attempt,
                                current_generation,
                                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                "Generation changed during processing, retrying"
                            );
                            self.events.try_emit(
                                events::PIPELINE_CONFLICT_RETRY,
                                events::event_payload(
                                    pipeline_id,
                                    json!({
                                        "attempt": attempt,
                                        "current_generation": current_generation,
                                        "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                    }),
                                ),
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp => {
                            tracing::warn!(
                                attempts = attempt,
                                "Giving up on pipeline after repeated generation conflicts"
                            );
                            return Err(ProcessingConflictError::new(pipeline_id, attempt).into());
                        }
                    }
                }
            }
        }
    }

    async fn acquire(&self, pipeline_id: PipelineId) -> Result<PipelineLease, StagegateError> {
        match self
            .locks
            .acquire(pipeline_id, self.config.lock_timeout())
            .await
        {
            Ok(lease) => Ok(lease),
            Err(err) => {
                tracing::info!(
                    waited_ms = err.waited_ms,
                    lease_key = %crate::locking::lease_key(pipeline_id),
                    "Cannot obtain an exclusive lease, the trigger should be re-enqueued"
                );
                self.events.try_emit(
                    events::PIPELINE_LEASE_UNAVAILABLE,
                    events::event_payload(pipeline_id, json!({ "waited_ms": err.waited_ms })),
                );
                Err(err.into())
            }
        }
    }

    async fn run_cycle(
        &self,
        pipeline_id: PipelineId,
        trigger: Option<&Trigger>,
    ) -> Result<CycleOutcome, StagegateError> {
        let mut collection = StatusCollection::load(self.store.as_ref(), pipeline_id).await?;

        if let Some(trigger) = trigger {
            apply_trigger(&mut collection, trigger);
        }

        let Propagation {
            unblocked,
            newly_skipped,
        } = propagate(&mut collection);

        let pipeline_status = collection.status_of_all()?;
        let stage_statuses = collection.stage_statuses()?;
        let processable_updates = collection.changed_processables();
        let outstanding = collection.processing_processables().len();

        let updated = !processable_updates.is_empty()
            || pipeline_status != collection.persisted_status()
            || stage_statuses != *collection.persisted_stage_statuses();

        let generation = if updated {
            let request = CommitRequest {
                pipeline_id,
                expected_generation: collection.generation(),
                processable_updates,
                pipeline_status,
                stage_statuses: stage_statuses.clone(),
            };
            match self.store.commit(request).await? {
                CommitOutcome::Committed { generation } => generation,
                CommitOutcome::Conflict { current_generation } => {
                    return Ok(CycleOutcome::Conflict { current_generation });
                }
            }
        } else {
            collection.generation()
        };

        Ok(CycleOutcome::Done(ProcessingResult {
            pipeline_status,
            unblocked,
            newly_skipped,
            stage_statuses,
            updated,
            generation,
            attempts: 1,
            outstanding,
        }))
    }

    async fn emit_processed(
        &self,
        pipeline_id: PipelineId,
        cycle_id: Uuid,
        result: &ProcessingResult,
        duration_ms: f64,
    ) {
        for id in &result.unblocked {
            self.events
                .emit(
                    events::PROCESSABLE_UNBLOCKED,
                    events::event_payload(pipeline_id, json!({ "processable_id": id })),
                )
                .await;
        }
        for id in &result.newly_skipped {
            self.events
                .emit(
                    events::PROCESSABLE_SKIPPED,
                    events::event_payload(pipeline_id, json!({ "processable_id": id })),
                )
                .await;
        }
        self.events
            .emit(
                events::PIPELINE_PROCESSED,
                events::event_payload(
                    pipeline_id,
                    json!({
                        "cycle_id": cycle_id.to_string(),
                        "status": result.pipeline_status,
                        "generation": result.generation,
                        "updated": result.updated,
                        "unblocked": result.unblocked.len(),
                        "skipped": result.newly_skipped.len(),
                        "attempts": result.attempts,
                        "outstanding": result.outstanding,
                        "duration_ms": duration_ms,
                    }),
                ),
            )
            .await;
    }
}

/// Applies the trigger to the collection.
///
/// A terminal processable is immutable: a trigger for one is dropped whole,
/// including its `allowed_to_fail` flag. Only a trigger that disagrees with
/// the recorded entry is worth a warning; an exact redelivery is silent.
fn apply_trigger(collection: &mut StatusCollection, trigger: &Trigger) {
    let current = collection
        .processable(trigger.processable_id)
        .map(Processable::entry);

    match current {
        Some(entry) if entry.status.is_terminal() => {
            let requested = StatusEntry::new(trigger.new_status, trigger.allowed_to_fail);
            if entry != requested {
                tracing::warn!(
                    processable_id = %trigger.processable_id,
                    current = %entry.status,
                    current_allowed_to_fail = entry.allowed_to_fail,
                    requested = %trigger.new_status,
                    requested_allowed_to_fail = trigger.allowed_to_fail,
                    "Ignoring trigger for a finished processable"
                );
            }
        }
        _ => {
            collection.set_processable_status(
                trigger.processable_id,
                trigger.new_status,
                trigger.allowed_to_fail,
            );
        }
    }
}
