//! Id snapshots and the id-diff reconciler
//!
//! Datatypes whose source has no reliable timestamp column detect inserts and
//! deletes by comparing the live id set with the last persisted snapshot.

use crate::adapters::database::traits::{SourceStore, StateStorage};
use crate::domain::{DatatypeDescriptor, DatatypeName, OutputRecord, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result of comparing live ids with the persisted snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdDiff {
    /// `live - snapshot`, ascending
    pub created: Vec<i64>,
    /// `snapshot - live`, ascending
    pub deleted: Vec<i64>,
}

impl IdDiff {
    /// Computes the set differences between the live and snapshot id lists
    ///
    /// # Examples
    ///
    /// ```
    /// use harvest::core::state::snapshot::IdDiff;
    ///
    /// let diff = IdDiff::compute(&[1, 3, 4], &[1, 2, 3]);
    /// assert_eq!(diff.created, vec![4]);
    /// assert_eq!(diff.deleted, vec![2]);
    /// ```
    pub fn compute(live: &[i64], snapshot: &[i64]) -> Self {
        let live: BTreeSet<i64> = live.iter().copied().collect();
        let snapshot: BTreeSet<i64> = snapshot.iter().copied().collect();

        Self {
            created: live.difference(&snapshot).copied().collect(),
            deleted: snapshot.difference(&live).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// Snapshot rows to write alongside a cursor update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotChange {
    pub datatype: DatatypeName,
    /// Ids to insert, tagged with `time_created`
    pub inserted: Vec<i64>,
    /// Ids to remove
    pub removed: Vec<i64>,
    /// Epoch seconds stored on inserted rows
    pub time_created: i64,
}

impl SnapshotChange {
    pub fn from_diff(datatype: DatatypeName, diff: &IdDiff, time_created: i64) -> Self {
        Self {
            datatype,
            inserted: diff.created.clone(),
            removed: diff.deleted.clone(),
            time_created,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty()
    }
}

/// Outcome of one reconciliation
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub diff: IdDiff,
    /// One id-only `d` record per deleted id
    pub deleted_records: Vec<OutputRecord>,
    /// Pending snapshot write, committed with the cursor
    pub change: SnapshotChange,
}

/// Computes id diffs for table-backed datatypes
pub struct IdDiffReconciler {
    source: Arc<dyn SourceStore>,
    state: Arc<dyn StateStorage>,
}

impl IdDiffReconciler {
    pub fn new(source: Arc<dyn SourceStore>, state: Arc<dyn StateStorage>) -> Self {
        Self { source, state }
    }

    /// Diffs the live ids of the descriptor's table against its snapshot
    ///
    /// Returns `None` for datatypes that do not reconcile ids. Nothing is
    /// persisted here; the returned change is committed by the cursor store.
    pub async fn reconcile(
        &self,
        descriptor: &DatatypeDescriptor,
        now: i64,
    ) -> Result<Option<Reconciliation>> {
        if !descriptor.reconciles_ids() {
            return Ok(None);
        }
        let Some(table) = descriptor.source_table() else {
            return Ok(None);
        };

        let live = self.source.fetch_ids(table).await?;
        let snapshot = self.state.snapshot_ids(&descriptor.name).await?;
        let diff = IdDiff::compute(&live, &snapshot);

        tracing::debug!(
            datatype = %descriptor.name,
            live = live.len(),
            snapshot = snapshot.len(),
            created = diff.created.len(),
            deleted = diff.deleted.len(),
            "Computed id diff"
        );

        let deleted_records = diff
            .deleted
            .iter()
            .map(|id| OutputRecord::deleted(descriptor.name.clone(), *id))
            .collect();
        let change = SnapshotChange::from_diff(descriptor.name.clone(), &diff, now);

        Ok(Some(Reconciliation {
            diff,
            deleted_records,
            change,
        }))
    }
}
