//! The processable record (a job or build).

use serde::{Deserialize, Serialize};

use super::{ProcessableId, Status, StatusEntry};

/// A single unit of work belonging to one stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processable {
    /// Unique within the pipeline.
    pub id: ProcessableId,
    /// Job name.
    pub name: String,
    /// Position of the owning stage.
    pub stage_position: i32,
    /// Current status.
    #[serde(default)]
    pub status: Status,
    /// Whether a failure of this job is tolerated by later stages.
    #[serde(default)]
    pub allowed_to_fail: bool,
}

impl Processable {
    /// Creates a processable in status `created`.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>, stage_position: i32) -> Self {
        Self {
            id: ProcessableId(id),
            name: name.into(),
            stage_position,
            status: Status::Created,
            allowed_to_fail: false,
        }
    }

    /// Sets the status.
    #[must_use]
    pub const fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Marks the processable as allowed to fail.
    #[must_use]
    pub const fn allow_failure(mut self) -> Self {
        self.allowed_to_fail = true;
        self
    }

    /// Returns the resolver entry for this processable.
    #[must_use]
    pub const fn entry(&self) -> StatusEntry {
        StatusEntry::new(self.status, self.allowed_to_fail)
    }
}
