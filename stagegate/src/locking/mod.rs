//! Pipeline-scoped exclusive leases.
//!
//! A processing cycle holds the lease for its pipeline from load to commit.
//! The lease is released when the [`PipelineLease`] is dropped, so every exit
//! path (including errors and panics) gives it back.

mod memory;

pub use memory::InMemoryPipelineLocks;

use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};

use crate::core::PipelineId;
use crate::errors::LeaseUnavailableError;

/// Returns the lease name for a pipeline.
#[must_use]
pub fn lease_key(pipeline_id: PipelineId) -> String {
    format!("ci/pipeline_processing/atomic_processing_service::pipeline_id:{pipeline_id}")
}

/// Anything that releases a lease when dropped.
pub trait LeaseGuard: Send + Sync {}

impl<T: Send + Sync> LeaseGuard for T {}

/// A held pipeline lease.
pub struct PipelineLease {
    pipeline_id: PipelineId,
    key: String,
    acquired_at: Instant,
    _guard: Box<dyn LeaseGuard>,
}

impl PipelineLease {
    /// Wraps a backend guard. Dropping the lease drops `guard`.
    #[must_use]
    pub fn new(pipeline_id: PipelineId, guard: impl LeaseGuard + 'static) -> Self {
        Self {
            pipeline_id,
            key: lease_key(pipeline_id),
            acquired_at: Instant::now(),
            _guard: Box::new(guard),
        }
    }

    /// The leased pipeline.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// The lease name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// How long the lease has been held.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl fmt::Debug for PipelineLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineLease")
            .field("pipeline_id", &self.pipeline_id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Lease provider. Scope is exactly one pipeline, never broader.
#[async_trait]
pub trait PipelineLocks: Send + Sync {
    /// Waits up to `timeout` for the lease on `pipeline_id`.
    async fn acquire(
        &self,
        pipeline_id: PipelineId,
        timeout: Duration,
    ) -> Result<PipelineLease, LeaseUnavailableError>;
}
