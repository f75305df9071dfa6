//! Per-cycle view of one pipeline's processable statuses.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::composite::CompositeStatusResolver;
use crate::core::{PipelineId, Processable, ProcessableId, Status, StatusEntry};
use crate::errors::{EmptySetError, PipelineNotFoundError, StagegateError};
use crate::store::{PipelineSnapshot, PipelineStore};

/// A consistent snapshot of a pipeline plus local, uncommitted overrides.
///
/// Built from a single bulk read. Every query runs over memory only, so a
/// cycle costs one read and one commit no matter how many queries it makes.
#[derive(Debug, Clone)]
pub struct StatusCollection {
    pipeline_id: PipelineId,
    generation: u64,
    persisted_status: Status,
    persisted_stage_statuses: BTreeMap<i32, Status>,
    /// Sorted by `(stage_position, id)`; statuses include overrides.
    processables: Vec<Processable>,
    /// Entries as read, parallel to `processables`.
    original: Vec<StatusEntry>,
    index: HashMap<ProcessableId, usize>,
}

impl StatusCollection {
    /// Loads the collection for `pipeline_id` with one read from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`StagegateError::PipelineNotFound`] if the pipeline does not
    /// exist, or [`StagegateError::Persistence`] if the read fails.
    pub async fn load(store: &dyn PipelineStore, pipeline_id: PipelineId) -> Result<Self, StagegateError> {
        let snapshot = store
            .load(pipeline_id)
            .await?
            .ok_or_else(|| PipelineNotFoundError::new(pipeline_id))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Builds the collection from an already loaded snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: PipelineSnapshot) -> Self {
        let mut processables = snapshot.processables;
        processables.sort_by_key(|p| (p.stage_position, p.id));

        let original = processables.iter().map(Processable::entry).collect();
        let index = processables
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i))
            .collect();

        Self {
            pipeline_id: snapshot.pipeline_id,
            generation: snapshot.generation,
            persisted_status: snapshot.status,
            persisted_stage_statuses: snapshot.stage_statuses,
            processables,
            original,
            index,
        }
    }

    /// The pipeline this collection describes.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Generation the snapshot was read at.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Pipeline status as persisted when loaded.
    #[must_use]
    pub const fn persisted_status(&self) -> Status {
        self.persisted_status
    }

    /// Stage statuses as persisted when loaded.
    #[must_use]
    pub const fn persisted_stage_statuses(&self) -> &BTreeMap<i32, Status> {
        &self.persisted_stage_statuses
    }

    /// Number of processables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processables.len()
    }

    /// Returns true if the pipeline has no processables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processables.is_empty()
    }

    /// Looks up a processable, including local overrides.
    #[must_use]
    pub fn processable(&self, id: ProcessableId) -> Option<&Processable> {
        self.index.get(&id).map(|&i| &self.processables[i])
    }

    /// Records a local status override.
    ///
    /// An id that is not part of this pipeline is ignored with a warning: the
    /// processable may have been removed concurrently. Returns whether the
    /// override was recorded.
    pub fn set_processable_status(
        &mut self,
        id: ProcessableId,
        status: Status,
        allowed_to_fail: bool,
    ) -> bool {
        let Some(&i) = self.index.get(&id) else {
            tracing::warn!(
                pipeline_id = %self.pipeline_id,
                processable_id = %id,
                status = %status,
                "Ignoring status update for unknown processable"
            );
            return false;
        };
        let job = &mut self.processables[i];
        job.status = status;
        job.allowed_to_fail = allowed_to_fail;
        true
    }

    /// Composite status over every processable in the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`EmptySetError`] if the pipeline has no processables.
    pub fn status_of_all(&self) -> Result<Status, EmptySetError> {
        CompositeStatusResolver::resolve_scoped(
            "pipeline",
            self.processables.iter().map(Processable::entry),
        )
    }

    /// Composite status over the processables named in `names`.
    ///
    /// Names not present in the pipeline are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EmptySetError`] if none of `names` match.
    pub fn status_for_names<S: AsRef<str>>(&self, names: &[S]) -> Result<Status, EmptySetError> {
        let wanted: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
        CompositeStatusResolver::resolve_scoped(
            "names",
            self.processables
                .iter()
                .filter(|p| wanted.contains(p.name.as_str()))
                .map(Processable::entry),
        )
    }

    /// Composite status of the stage at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`EmptySetError`] if no processable has that position.
    pub fn status_for_stage_position(&self, position: i32) -> Result<Status, EmptySetError> {
        CompositeStatusResolver::resolve_scoped(
            &format!("stage {position}"),
            self.stage(position).iter().map(Processable::entry),
        )
    }

    /// Composite status of every stage before `position`.
    ///
    /// With nothing before `position` the result is `success`: an empty
    /// history never blocks the first stage.
    #[must_use]
    pub fn status_for_prior_stage_position(&self, position: i32) -> Status {
        CompositeStatusResolver::resolve(self.prior(position).iter().map(Processable::entry))
            .unwrap_or(Status::Success)
    }

    /// Ids of `created` processables at `position`.
    #[must_use]
    pub fn created_processable_ids_for_stage_position(&self, position: i32) -> BTreeSet<ProcessableId> {
        self.stage(position)
            .iter()
            .filter(|p| p.status == Status::Created)
            .map(|p| p.id)
            .collect()
    }

    /// Processables not yet terminal, in stage order.
    #[must_use]
    pub fn processing_processables(&self) -> Vec<&Processable> {
        self.processables
            .iter()
            .filter(|p| p.status.is_processing())
            .collect()
    }

    /// Distinct stage positions, ascending.
    #[must_use]
    pub fn stage_positions(&self) -> Vec<i32> {
        let mut positions: Vec<i32> = self.processables.iter().map(|p| p.stage_position).collect();
        positions.dedup();
        positions
    }

    /// Composite status of every stage, keyed by position.
    ///
    /// # Errors
    ///
    /// Propagates [`EmptySetError`]; every listed position has at least one
    /// processable, so this only fails on an internal bug.
    pub fn stage_statuses(&self) -> Result<BTreeMap<i32, Status>, EmptySetError> {
        self.stage_positions()
            .into_iter()
            .map(|position| Ok((position, self.status_for_stage_position(position)?)))
            .collect()
    }

    /// Processables whose entry differs from what was read, by id.
    #[must_use]
    pub fn changed_processables(&self) -> BTreeMap<ProcessableId, StatusEntry> {
        self.processables
            .iter()
            .zip(&self.original)
            .filter(|(current, original)| current.entry() != **original)
            .map(|(current, _)| (current.id, current.entry()))
            .collect()
    }

    fn stage(&self, position: i32) -> &[Processable] {
        let start = self.processables.partition_point(|p| p.stage_position < position);
        let end = self.processables.partition_point(|p| p.stage_position <= position);
        &self.processables[start..end]
    }

    fn prior(&self, position: i32) -> &[Processable] {
        let end = self.processables.partition_point(|p| p.stage_position < position);
        &self.processables[..end]
    }
}
