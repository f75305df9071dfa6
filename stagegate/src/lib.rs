//! # Stagegate
//!
//! Stage-gated status aggregation and propagation for CI pipelines.
//!
//! A pipeline is a set of processables (jobs, bridges) grouped into ordered
//! stages. Stagegate provides:
//!
//! - **Composite status**: a fixed-precedence reduction of many statuses to one
//! - **Stage-by-stage propagation**: unblock the next stage once everything
//!   before it passed, skip everything downstream of a failure
//! - **Atomic processing**: one lease per pipeline, generation-checked commits
//!   and bounded retry on conflict
//! - **Event-driven observability**: structured `tracing` spans plus an event
//!   sink describing every cycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagegate::prelude::*;
//!
//! let store = InMemoryPipelineStore::new();
//! store.insert(PipelineSnapshot::new(
//!     PipelineId(1),
//!     vec![Processable::new(1, "build", 0), Processable::new(2, "test", 1)],
//! ));
//!
//! let processor = AtomicPipelineProcessor::new(Arc::new(store));
//! processor.process_pipeline(PipelineId(1)).await?;
//!
//! let result = processor
//!     .process(PipelineId(1), Trigger::new(ProcessableId(1), Status::Success))
//!     .await?;
//! assert_eq!(result.unblocked, vec![ProcessableId(2)]);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod collection;
pub mod composite;
pub mod core;
pub mod errors;
pub mod events;
pub mod locking;
pub mod observability;
pub mod processing;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::collection::StatusCollection;
    pub use crate::composite::{CompositeStatusResolver, StatusTally};
    pub use crate::core::{PipelineId, Processable, ProcessableId, Status, StatusEntry};
    pub use crate::errors::{
        EmptySetError, LeaseUnavailableError, PersistenceError, PipelineNotFoundError,
        ProcessingConflictError, StagegateError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::locking::{InMemoryPipelineLocks, PipelineLease, PipelineLocks};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::processing::{
        AtomicPipelineProcessor, ProcessingResult, ProcessorConfig, RetryConfig, Trigger,
        TriggerEvent,
    };
    pub use crate::store::{
        CommitOutcome, CommitRequest, InMemoryPipelineStore, PipelineSnapshot, PipelineStore,
    };
}
