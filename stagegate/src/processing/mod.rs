//! Pipeline processing.
//!
//! [`AtomicPipelineProcessor`] turns one status change into the complete
//! set of consequences for its pipeline: which processables to dispatch,
//! which to skip, and the new stage and pipeline statuses. Cycles run under
//! a pipeline lease and commit with a generation check; conflicts are
//! retried with backoff according to [`RetryConfig`].

mod config;
mod processor;
mod propagation;
mod retry;
mod trigger;

#[cfg(test)]
mod integration_tests;

pub use config::ProcessorConfig;
pub use processor::AtomicPipelineProcessor;
pub use propagation::{propagate, Propagation};
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState};
pub use trigger::{ProcessingResult, Trigger, TriggerEvent};
