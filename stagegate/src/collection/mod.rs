//! In-memory status collection for one processing cycle.

mod status_collection;

pub use status_collection::StatusCollection;
