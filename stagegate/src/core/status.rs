//! Processable status and the `(status, allowed_to_fail)` entry pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The status of a processable, and of any composite built from processables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created with the pipeline, not yet eligible to run.
    Created,
    /// Eligible for dispatch, waiting for an executor.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with a failure.
    Failed,
    /// Canceled before finishing.
    Canceled,
    /// Never run because an earlier stage blocked it.
    Skipped,
}

impl Default for Status {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

impl Status {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::Pending,
        Self::Running,
        Self::Success,
        Self::Failed,
        Self::Canceled,
        Self::Skipped,
    ];

    /// Returns the persisted name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
        }
    }

    /// Returns true if the status is final and never reopened.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Canceled | Self::Skipped
        )
    }

    /// Returns true for `created`, `pending` and `running`.
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if a prior-stage composite with this status lets later
    /// stages start.
    #[must_use]
    pub const fn is_passing(&self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }

    /// Returns true if a prior-stage composite with this status forces later
    /// stages to be skipped.
    ///
    /// Only meaningful on composites: the resolver already folds
    /// `allowed_to_fail` into whether `failed` is reported.
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }
}

/// One `(status, allowed_to_fail)` pair fed to the composite resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusEntry {
    /// The processable's status.
    pub status: Status,
    /// Whether a `failed` status should be tolerated.
    pub allowed_to_fail: bool,
}

impl StatusEntry {
    /// Creates a new entry.
    #[must_use]
    pub const fn new(status: Status, allowed_to_fail: bool) -> Self {
        Self {
            status,
            allowed_to_fail,
        }
    }

    /// Creates an entry that is not allowed to fail.
    #[must_use]
    pub const fn strict(status: Status) -> Self {
        Self::new(status, false)
    }

    /// Returns true if this entry is a failure that blocks later stages.
    #[must_use]
    pub const fn is_blocking_failure(&self) -> bool {
        matches!(self.status, Status::Failed) && !self.allowed_to_fail
    }
}

impl From<Status> for StatusEntry {
    fn from(status: Status) -> Self {
        Self::strict(status)
    }
}
