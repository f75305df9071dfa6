//! Error types for the stagegate engine.
//!
//! Each failure mode has its own error struct so callers can match on the
//! exact condition; [`StagegateError`] aggregates them for `?` propagation.

use serde_json::json;
use thiserror::Error;

use crate::core::PipelineId;

/// The main error type for stagegate operations.
#[derive(Debug, Error)]
pub enum StagegateError {
    /// The pipeline referenced by a trigger does not exist.
    #[error("{0}")]
    PipelineNotFound(#[from] PipelineNotFoundError),

    /// A composite status was requested over zero processables.
    #[error("{0}")]
    EmptySet(#[from] EmptySetError),

    /// Concurrent writers kept invalidating the generation check.
    #[error("{0}")]
    ProcessingConflict(#[from] ProcessingConflictError),

    /// The pipeline lock could not be acquired in time.
    #[error("{0}")]
    LeaseUnavailable(#[from] LeaseUnavailableError),

    /// The persistence layer failed; nothing was written.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// Invalid processor configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl StagegateError {
    /// Returns true if the trigger should be redelivered later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProcessingConflict(_) | Self::LeaseUnavailable(_))
    }

    /// Stable error code for monitoring.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PipelineNotFound(_) => "pipeline_not_found",
            Self::EmptySet(_) => "empty_set",
            Self::ProcessingConflict(_) => "processing_conflict",
            Self::LeaseUnavailable(_) => "lease_unavailable",
            Self::Persistence(_) => "persistence",
            Self::Config(_) => "config",
        }
    }

    /// Converts to an event payload.
    #[must_use]
    pub fn to_event_data(&self) -> serde_json::Value {
        json!({
            "code": self.code(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        })
    }
}

/// Error raised when a pipeline does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Pipeline {pipeline_id} not found")]
pub struct PipelineNotFoundError {
    /// The missing pipeline.
    pub pipeline_id: PipelineId,
}

impl PipelineNotFoundError {
    /// Creates a new error.
    #[must_use]
    pub const fn new(pipeline_id: PipelineId) -> Self {
        Self { pipeline_id }
    }
}

/// Error raised when the composite resolver is given no entries.
///
/// Every stage and pipeline has at least one processable, so this always
/// indicates a bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot resolve composite status of an empty set ({scope})")]
pub struct EmptySetError {
    /// What was being resolved, e.g. `stage 2`.
    pub scope: String,
}

impl EmptySetError {
    /// Creates a new error.
    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }
}

/// Error raised when the retry budget for generation conflicts runs out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Pipeline {pipeline_id} was modified concurrently; gave up after {attempts} attempts")]
pub struct ProcessingConflictError {
    /// The contended pipeline.
    pub pipeline_id: PipelineId,
    /// Number of cycles attempted.
    pub attempts: usize,
}

impl ProcessingConflictError {
    /// Creates a new error.
    #[must_use]
    pub const fn new(pipeline_id: PipelineId, attempts: usize) -> Self {
        Self {
            pipeline_id,
            attempts,
        }
    }
}

/// Error raised when the pipeline-scoped lock wait times out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot obtain an exclusive lease for pipeline {pipeline_id} within {waited_ms}ms")]
pub struct LeaseUnavailableError {
    /// The locked pipeline.
    pub pipeline_id: PipelineId,
    /// How long the caller waited.
    pub waited_ms: u64,
}

impl LeaseUnavailableError {
    /// Creates a new error.
    #[must_use]
    pub const fn new(pipeline_id: PipelineId, waited_ms: u64) -> Self {
        Self {
            pipeline_id,
            waited_ms,
        }
    }
}

/// Error raised by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Persistence error: {message}")]
pub struct PersistenceError {
    /// Backend-provided description.
    pub message: String,
}

impl PersistenceError {
    /// Creates a new error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
