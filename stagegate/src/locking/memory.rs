//! Process-local pipeline leases.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{PipelineLease, PipelineLocks};
use crate::core::PipelineId;
use crate::errors::LeaseUnavailableError;

type LockTable = DashMap<PipelineId, Arc<Mutex<()>>>;

/// One async mutex per pipeline, created on demand and dropped once nobody
/// holds or waits for it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPipelineLocks {
    locks: Arc<LockTable>,
}

impl InMemoryPipelineLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if some cycle currently holds the pipeline's lease.
    #[must_use]
    pub fn is_locked(&self, pipeline_id: PipelineId) -> bool {
        self.locks
            .get(&pipeline_id)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }

    /// Number of pipelines with a live mutex.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

struct HeldLock {
    locks: Arc<LockTable>,
    pipeline_id: PipelineId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left: no holder, no waiter.
        self.locks
            .remove_if(&self.pipeline_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[async_trait]
impl PipelineLocks for InMemoryPipelineLocks {
    async fn acquire(
        &self,
        pipeline_id: PipelineId,
        timeout: Duration,
    ) -> Result<PipelineLease, LeaseUnavailableError> {
        let mutex = self.locks.entry(pipeline_id).or_default().clone();

        let guard = tokio::time::timeout(timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                LeaseUnavailableError::new(
                    pipeline_id,
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                )
            })?;

        Ok(PipelineLease::new(
            pipeline_id,
            HeldLock {
                locks: Arc::clone(&self.locks),
                pipeline_id,
                guard: Some(guard),
            },
        ))
    }
}
