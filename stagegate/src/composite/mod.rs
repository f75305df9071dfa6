//! Composite status resolution.
//!
//! Turns any non-empty set of processable statuses into the single status
//! that summarises it. Stage and pipeline statuses are both computed here.

mod resolver;

pub use resolver::{CompositeStatusResolver, StatusTally};
