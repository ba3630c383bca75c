//! Cursor store
//!
//! This module provides the [`CursorStore`], which reads and advances the
//! per-datatype export cursors kept by a [`StateStorage`] backend.

use crate::adapters::database::traits::StateStorage;
use crate::core::state::cursor::ExportCursor;
use crate::core::state::snapshot::SnapshotChange;
use crate::domain::{DatatypeName, Result};
use std::future::Future;
use std::sync::Arc;

/// Export log / cursor store
///
/// Cursors are created lazily, advanced after every successful batch and only
/// reset explicitly.
pub struct CursorStore {
    /// State storage backend
    storage: Arc<dyn StateStorage>,
}

impl CursorStore {
    /// Create a new CursorStore with a state storage backend
    pub fn new(storage: Arc<dyn StateStorage>) -> Self {
        Self { storage }
    }

    /// Load a cursor, or a zeroed one if the datatype was never exported
    pub async fn load(&self, datatype: &DatatypeName) -> Result<ExportCursor> {
        Ok(self
            .storage
            .load_cursor(datatype)
            .await?
            .unwrap_or_else(|| ExportCursor::new(datatype.clone())))
    }

    /// `(last_exported_time, last_exported_id)`, `(0, 0)` if never exported
    pub async fn get_cursor(&self, datatype: &DatatypeName) -> Result<(i64, i64)> {
        Ok(self.load(datatype).await?.position())
    }

    /// Record a successful batch
    ///
    /// Sets `last_exported_time` to `export_time`. When the batch produced
    /// rows, `last_exported_id` moves to the last row id and
    /// `records_migrated` is refreshed through `count_up_to`, which receives
    /// the id the cursor ends on. The optional snapshot change is committed in
    /// the same transaction as the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the count or the commit fails; in that case the
    /// stored cursor is unchanged.
    pub async fn record_batch<F, Fut>(
        &self,
        datatype: &DatatypeName,
        last_record_id: Option<i64>,
        export_time: i64,
        count_up_to: F,
        snapshot: Option<&SnapshotChange>,
    ) -> Result<ExportCursor>
    where
        F: FnOnce(i64) -> Fut + Send,
        Fut: Future<Output = Result<u64>> + Send,
    {
        let mut cursor = self.load(datatype).await?;

        let records_migrated = match last_record_id {
            Some(id) => Some(count_up_to(cursor.last_exported_id.max(id)).await?),
            None => None,
        };
        cursor.apply_batch(last_record_id, export_time, records_migrated);

        let snapshot = snapshot.filter(|change| !change.is_empty());
        self.storage.commit_batch(&cursor, snapshot).await?;

        tracing::info!(
            datatype = %datatype,
            last_exported_id = cursor.last_exported_id,
            last_exported_time = cursor.last_exported_time,
            records_migrated = cursor.records_migrated,
            "Cursor advanced"
        );
        Ok(cursor)
    }

    /// Flag historical backfill as finished; idempotent
    pub async fn mark_migrated(&self, datatype: &DatatypeName) -> Result<()> {
        let mut cursor = self.load(datatype).await?;
        if cursor.migrated {
            return Ok(());
        }
        cursor.migrated = true;
        self.storage.save_cursor(&cursor).await
    }

    pub async fn set_records_count(&self, datatype: &DatatypeName, count: u64) -> Result<()> {
        let mut cursor = self.load(datatype).await?;
        if cursor.records_count == count && !cursor.is_new() {
            return Ok(());
        }
        cursor.records_count = count;
        self.storage.save_cursor(&cursor).await
    }

    /// Zero every cursor
    pub async fn reset_all(&self) -> Result<()> {
        self.storage.reset_cursors().await
    }

    pub async fn all_cursors(&self) -> Result<Vec<ExportCursor>> {
        self.storage.all_cursors().await
    }
}
