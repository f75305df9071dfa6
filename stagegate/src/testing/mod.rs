//! Testing utilities for stagegate.
//!
//! This module provides:
//! - Pipeline fixtures seeded into an in-memory store
//! - Store doubles that interfere with, race or fail commits
//! - Assertions over persisted state

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_generation, assert_pipeline_status, assert_processable_status, assert_stage_status,
};
pub use fixtures::PipelineFixture;
pub use mocks::{FailingStore, InterferingStore, LockstepStore};
