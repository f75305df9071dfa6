//! Core domain model types for stagegate.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Processable status and the resolver entry pair
//! - Pipeline and processable identifiers
//! - The processable record

mod ids;
mod processable;
mod status;

pub use ids::{PipelineId, ProcessableId};
pub use processable::Processable;
pub use status::{ParseStatusError, Status, StatusEntry};
