//! Store doubles for exercising conflict and failure paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Barrier;

use crate::core::PipelineId;
use crate::errors::PersistenceError;
use crate::store::{CommitOutcome, CommitRequest, InMemoryPipelineStore, PipelineSnapshot, PipelineStore};

/// A store where a foreign writer bumps the generation right before each of
/// the first `interferences` commits, so those commits hit a conflict.
#[derive(Debug)]
pub struct InterferingStore {
    inner: InMemoryPipelineStore,
    remaining: AtomicUsize,
    commits: AtomicUsize,
}

impl InterferingStore {
    /// Wraps `inner`, interfering with the first `interferences` commits.
    #[must_use]
    pub fn new(inner: InMemoryPipelineStore, interferences: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(interferences),
            commits: AtomicUsize::new(0),
        }
    }

    /// Returns the number of commit calls seen, conflicting or not.
    #[must_use]
    pub fn commit_calls(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns the wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryPipelineStore {
        &self.inner
    }
}

#[async_trait]
impl PipelineStore for InterferingStore {
    async fn load(&self, pipeline_id: PipelineId) -> Result<Option<PipelineSnapshot>, PersistenceError> {
        self.inner.load(pipeline_id).await
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, PersistenceError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let interfere = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if interfere {
            self.inner.touch(request.pipeline_id);
        }
        self.inner.commit(request).await
    }
}

/// A store that holds the first `parties` loads until all of them have read.
///
/// Cycles gated this way start from the same generation, so all but one of
/// their commits are rejected. Later loads pass straight through.
#[derive(Debug)]
pub struct LockstepStore {
    inner: InMemoryPipelineStore,
    gated: AtomicUsize,
    barrier: Barrier,
}

impl LockstepStore {
    /// Wraps `inner`, gating the first `parties` loads.
    #[must_use]
    pub fn new(inner: InMemoryPipelineStore, parties: usize) -> Self {
        Self {
            inner,
            gated: AtomicUsize::new(parties),
            barrier: Barrier::new(parties),
        }
    }
}

#[async_trait]
impl PipelineStore for LockstepStore {
    async fn load(&self, pipeline_id: PipelineId) -> Result<Option<PipelineSnapshot>, PersistenceError> {
        let snapshot = self.inner.load(pipeline_id).await?;
        let gated = self
            .gated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gated {
            self.barrier.wait().await;
        }
        Ok(snapshot)
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, PersistenceError> {
        self.inner.commit(request).await
    }
}

/// A store whose commits always fail.
#[derive(Debug)]
pub struct FailingStore {
    inner: InMemoryPipelineStore,
    message: String,
    attempted: Mutex<Vec<CommitRequest>>,
}

impl FailingStore {
    /// Wraps `inner`; loads succeed, commits fail with `message`.
    #[must_use]
    pub fn new(inner: InMemoryPipelineStore, message: impl Into<String>) -> Self {
        Self {
            inner,
            message: message.into(),
            attempted: Mutex::new(Vec::new()),
        }
    }

    /// Returns the commit requests that were rejected.
    #[must_use]
    pub fn attempted(&self) -> Vec<CommitRequest> {
        self.attempted.lock().clone()
    }
}

#[async_trait]
impl PipelineStore for FailingStore {
    async fn load(&self, pipeline_id: PipelineId) -> Result<Option<PipelineSnapshot>, PersistenceError> {
        self.inner.load(pipeline_id).await
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, PersistenceError> {
        self.attempted.lock().push(request);
        Err(PersistenceError::new(self.message.clone()))
    }
}
