//! Stage-by-stage unblocking and skipping.

use crate::collection::StatusCollection;
use crate::core::{ProcessableId, Status};

/// Transitions decided by one propagation walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    /// `created -> pending`, in stage order.
    pub unblocked: Vec<ProcessableId>,
    /// `created -> skipped`, in stage order.
    pub newly_skipped: Vec<ProcessableId>,
}

/// Walks stages in ascending position, deciding the fate of each stage's
/// `created` processables from the composite of everything before it.
///
/// Each decision sees the transitions already made earlier in the same walk.
/// A stage whose prior composite is still in progress is left untouched and
/// the walk moves on; later stages will see an in-progress prior as well.
pub fn propagate(collection: &mut StatusCollection) -> Propagation {
    let mut propagation = Propagation::default();

    for position in collection.stage_positions() {
        let prior = collection.status_for_prior_stage_position(position);
        let target = if prior.is_passing() {
            Status::Pending
        } else if prior.is_blocking() {
            Status::Skipped
        } else {
            continue;
        };

        for id in collection.created_processable_ids_for_stage_position(position) {
            let allowed_to_fail = collection
                .processable(id)
                .is_some_and(|p| p.allowed_to_fail);
            collection.set_processable_status(id, target, allowed_to_fail);

            if target == Status::Pending {
                propagation.unblocked.push(id);
            } else {
                propagation.newly_skipped.push(id);
            }
        }
    }

    propagation
}
