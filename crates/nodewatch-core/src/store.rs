//! Latest-snapshot store with node selection.
//!
//! [`SnapshotStore`] holds the most recent [`DatasetSnapshot`] and the id of
//! the selected node. The selected node's record is never stored on its own:
//! it is looked up in the current snapshot on every read, so it is always a
//! function of `(dataset, selected_id)` and can never go stale.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use nodewatch_types::{DatasetSnapshot, NodeId, ResolvedView, TelemetryRecord};

use crate::error::{Error, Result};

/// What [`SnapshotStore::select`] does with an id that is not in the
/// current snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Reject the selection and keep the previous one.
    #[default]
    KeepPrevious,
    /// Select the id anyway. The resolved record stays absent until a
    /// snapshot containing the node arrives.
    AcceptAbsent,
}

/// Snapshot of all nodes plus the current selection.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    dataset: DatasetSnapshot,
    selected_id: Option<NodeId>,
    policy: SelectionPolicy,
    revision: u64,
    last_updated: Option<OffsetDateTime>,
}

impl SnapshotStore {
    /// Create an empty store with the default selection policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given selection policy.
    pub fn with_policy(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Replace the dataset with a new snapshot.
    ///
    /// This is a total replacement: nodes missing from `dataset` are gone.
    /// The selected id is kept even when the node disappears, in which case
    /// [`current_selection`](Self::current_selection) returns `None` until a
    /// later snapshot contains it again.
    pub fn apply_snapshot(&mut self, dataset: DatasetSnapshot) {
        self.dataset = dataset;
        self.revision += 1;
        self.last_updated = Some(OffsetDateTime::now_utc());

        if let Some(id) = &self.selected_id
            && !self.dataset.contains(id)
        {
            debug!("Selected node '{}' is absent from revision {}", id, self.revision);
        }
    }

    /// Select a node by id.
    ///
    /// Ids not present in the current snapshot are handled according to the
    /// store's [`SelectionPolicy`]. With [`SelectionPolicy::KeepPrevious`]
    /// the call returns [`Error::SelectionNotFound`] and changes nothing.
    pub fn select(&mut self, id: &str) -> Result<()> {
        if !self.dataset.contains(id) && self.policy == SelectionPolicy::KeepPrevious {
            return Err(Error::selection_not_found(id));
        }

        self.selected_id = Some(id.to_string());
        Ok(())
    }

    /// Set the selection without checking the dataset, regardless of policy.
    /// Used for a configured initial node before any data has arrived.
    pub(crate) fn preselect(&mut self, id: &str) {
        self.selected_id = Some(id.to_string());
    }

    /// Node ids in the current snapshot, sorted.
    pub fn list_ids(&self) -> Vec<NodeId> {
        self.dataset.ids()
    }

    /// The selected node's record in the current snapshot.
    pub fn current_selection(&self) -> Option<&TelemetryRecord> {
        self.selected_id
            .as_deref()
            .and_then(|id| self.dataset.get(id))
    }

    /// The selected node id, whether or not it is present.
    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    /// Build the derived view for presentation code.
    pub fn resolved_view(&self) -> ResolvedView {
        ResolvedView {
            node_ids: self.list_ids(),
            selected_id: self.selected_id.clone(),
            selected: self.current_selection().cloned(),
        }
    }

    pub fn dataset(&self) -> &DatasetSnapshot {
        &self.dataset
    }

    /// Number of snapshots applied so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// When the last snapshot was applied.
    pub fn last_updated(&self) -> Option<OffsetDateTime> {
        self.last_updated
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Drop the dataset and the selection. Only used on disposal.
    pub(crate) fn clear(&mut self) {
        self.dataset = DatasetSnapshot::new();
        self.selected_id = None;
    }
}
