//! Fixed-precedence composite status resolution.

use crate::core::{Status, StatusEntry};
use crate::errors::EmptySetError;

/// Counts of a set of entries, enough to decide the composite status.
///
/// Built in one pass; the composite depends only on the counts, never on
/// the order the entries arrived in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTally {
    total: usize,
    created: usize,
    pending: usize,
    running: usize,
    blocking_failed: usize,
    canceled: usize,
    skipped: usize,
}

impl StatusTally {
    /// Creates an empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one entry.
    pub fn add(&mut self, entry: StatusEntry) {
        self.total += 1;
        match entry.status {
            Status::Created => self.created += 1,
            Status::Pending => self.pending += 1,
            Status::Running => self.running += 1,
            Status::Failed if !entry.allowed_to_fail => self.blocking_failed += 1,
            Status::Canceled => self.canceled += 1,
            Status::Skipped => self.skipped += 1,
            Status::Success | Status::Failed => {}
        }
    }

    /// Number of entries added.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.total
    }

    /// Returns true if nothing was added.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns the composite status, or `None` for an empty tally.
    #[must_use]
    pub const fn composite(&self) -> Option<Status> {
        if self.total == 0 {
            return None;
        }
        if self.created == self.total {
            return Some(Status::Created);
        }
        if self.running > 0 {
            return Some(Status::Running);
        }
        if self.pending > 0 {
            return Some(Status::Pending);
        }
        if self.blocking_failed > 0 {
            return Some(Status::Failed);
        }
        if self.canceled > 0 {
            return Some(Status::Canceled);
        }
        // Created entries are not terminal and do not count here.
        let terminal = self.total - self.created;
        if self.skipped == terminal {
            return Some(Status::Skipped);
        }
        Some(Status::Success)
    }
}

impl FromIterator<StatusEntry> for StatusTally {
    fn from_iter<I: IntoIterator<Item = StatusEntry>>(iter: I) -> Self {
        let mut tally = Self::new();
        for entry in iter {
            tally.add(entry);
        }
        tally
    }
}

impl Extend<StatusEntry> for StatusTally {
    fn extend<I: IntoIterator<Item = StatusEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.add(entry);
        }
    }
}

/// Resolves a set of `(status, allowed_to_fail)` entries to one status.
///
/// Rules, first match wins:
///
/// 1. every entry `created` -> `created`
/// 2. any `running` -> `running`
/// 3. any `pending` -> `pending`
/// 4. any `failed` not allowed to fail -> `failed`
/// 5. any `canceled` -> `canceled`
/// 6. every terminal entry `skipped` -> `skipped`
/// 7. otherwise -> `success`
///
/// Stateless and safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeStatusResolver;

impl CompositeStatusResolver {
    /// Resolves the composite status of `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`EmptySetError`] if `entries` is empty.
    pub fn resolve<I>(entries: I) -> Result<Status, EmptySetError>
    where
        I: IntoIterator<Item = StatusEntry>,
    {
        Self::resolve_scoped("entries", entries)
    }

    /// Like [`resolve`](Self::resolve), naming `scope` in the error.
    ///
    /// # Errors
    ///
    /// Returns [`EmptySetError`] if `entries` is empty.
    pub fn resolve_scoped<I>(scope: &str, entries: I) -> Result<Status, EmptySetError>
    where
        I: IntoIterator<Item = StatusEntry>,
    {
        entries
            .into_iter()
            .collect::<StatusTally>()
            .composite()
            .ok_or_else(|| EmptySetError::new(scope))
    }
}
