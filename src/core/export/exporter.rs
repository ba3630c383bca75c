//! Record exporter
//!
//! Pulls new or changed rows of one datatype since its cursor, runs them
//! through the entity transform and appends them to the datatype's storage
//! backend. The cursor only moves after every row has been handed over and
//! flushed.

use crate::adapters::database::traits::{RecordFilter, RecordQuery, SourceStore};
use crate::core::state::{CursorStore, ExportCursor, IdDiffReconciler};
use crate::core::storage::StorageRouter;
use crate::core::transform::{encode, transform_row, EntityTransform};
use crate::domain::{
    BufferedRecord, Crud, DatatypeDescriptor, HarvestError, IncrementalStrategy, OutputRecord,
    Result, SerializationFormat, SourceRow,
};
use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;

/// Migration window `[offset, offset + limit)` over rows ordered by id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportWindow {
    pub offset: u64,
    pub limit: u64,
}

/// What a batch reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportParams {
    pub window: Option<ExportWindow>,
}

impl ExportParams {
    pub fn incremental() -> Self {
        Self::default()
    }

    pub fn window(offset: u64, limit: u64) -> Self {
        Self {
            window: Some(ExportWindow { offset, limit }),
        }
    }
}

/// Result of one successful batch
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Records appended to storage, deletions included
    pub records_exported: u64,
    pub deleted: u64,
    pub cursor: ExportCursor,
}

/// Tunables shared by every batch
#[derive(Debug, Clone, Copy)]
pub struct ExporterSettings {
    pub format: SerializationFormat,
    pub page_size: u64,
    pub max_text_length: usize,
}

pub struct RecordExporter {
    source: Arc<dyn SourceStore>,
    cursors: Arc<CursorStore>,
    reconciler: IdDiffReconciler,
    storage: StorageRouter,
    settings: ExporterSettings,
}

struct PageState {
    query: RecordQuery,
    after_id: Option<i64>,
    remaining: Option<u64>,
    done: bool,
}

impl RecordExporter {
    pub fn new(
        source: Arc<dyn SourceStore>,
        cursors: Arc<CursorStore>,
        reconciler: IdDiffReconciler,
        storage: StorageRouter,
        settings: ExporterSettings,
    ) -> Self {
        Self {
            source,
            cursors,
            reconciler,
            storage,
            settings,
        }
    }

    /// Base query of a datatype: its source and fixed conditions, no filter
    ///
    /// # Errors
    ///
    /// Returns a configuration error for datatypes without a row source.
    pub fn base_query(descriptor: &DatatypeDescriptor) -> Result<RecordQuery> {
        let source = descriptor.source.clone().ok_or_else(|| {
            HarvestError::Configuration(format!("Datatype '{}' has no row source", descriptor.name))
        })?;
        Ok(RecordQuery::new(source).with_conditions(descriptor.conditions.clone()))
    }

    /// Rows of a datatype, ignoring any incremental filter
    pub async fn count_source_rows(&self, descriptor: &DatatypeDescriptor) -> Result<u64> {
        self.source.count_rows(&Self::base_query(descriptor)?).await
    }

    /// Export one batch for a datatype
    ///
    /// # Errors
    ///
    /// Any store, transform or storage failure aborts the batch before the
    /// cursor is written. Records already appended stay in storage and are
    /// exported again by the next run.
    pub async fn export_batch(
        &self,
        descriptor: &DatatypeDescriptor,
        params: ExportParams,
    ) -> Result<BatchOutcome> {
        let name = &descriptor.name;
        let cursor = self.cursors.load(name).await?;
        let now = chrono::Utc::now().timestamp();

        // Later migration windows keep the time the backfill started at, so
        // rows changed meanwhile are picked up by the first incremental pass.
        // Rows stamped with the current second may change again after they
        // are read, so that second is exported again next time.
        let export_time = match params.window {
            Some(window) if window.offset > 0 && cursor.last_exported_time > 0 => cursor.last_exported_time,
            _ => now - 1,
        };

        let base = Self::base_query(descriptor)?;
        let query = match params.window {
            Some(window) => base.clone().with_offset(window.offset),
            None => base.clone().with_filter(incremental_filter(descriptor, &cursor)),
        };
        let limit = params.window.map(|w| w.limit);

        tracing::info!(
            datatype = %name,
            last_exported_time = cursor.last_exported_time,
            last_exported_id = cursor.last_exported_id,
            window = ?params.window,
            "Exporting batch"
        );

        let backend = self.storage.for_descriptor(descriptor);
        let transform = EntityTransform::for_descriptor(descriptor, self.settings.max_text_length);

        let mut last_id: Option<i64> = None;
        let mut exported = 0u64;

        let mut pages = Box::pin(self.row_pages(query, limit));
        while let Some(rows) = pages.try_next().await? {
            for row in &rows {
                let crud = row_crud(descriptor, &cursor, params, row);
                let record = transform_row(descriptor, &transform, row, crud)?;
                backend.append(self.buffered(descriptor, &record)?).await?;
                last_id = Some(row.id);
                exported += 1;
            }
        }

        let mut deleted = 0u64;
        let mut snapshot = None;
        if let Some(reconciliation) = self.reconciler.reconcile(descriptor, now).await? {
            for record in &reconciliation.deleted_records {
                backend.append(self.buffered(descriptor, record)?).await?;
                deleted += 1;
            }
            snapshot = Some(reconciliation.change);
        }

        backend.flush(name).await?;

        let source = self.source.clone();
        let count_query = base;
        let cursor = self
            .cursors
            .record_batch(
                name,
                last_id,
                export_time,
                move |up_to| async move { source.count_rows(&count_query.with_up_to_id(up_to)).await },
                snapshot.as_ref(),
            )
            .await?;

        tracing::info!(
            datatype = %name,
            records = exported,
            deleted,
            "Batch exported"
        );

        Ok(BatchOutcome {
            records_exported: exported + deleted,
            deleted,
            cursor,
        })
    }

    fn buffered(&self, descriptor: &DatatypeDescriptor, record: &OutputRecord) -> Result<BufferedRecord> {
        Ok(BufferedRecord {
            datatype: descriptor.name.clone(),
            crud: record.crud,
            data_id: record.id,
            line: encode(record, &descriptor.fields, self.settings.format)?,
        })
    }

    /// Pages of rows ordered by id
    ///
    /// The first page honours the query offset; later pages continue from the
    /// last id seen, so only one page is held in memory at a time.
    fn row_pages(
        &self,
        query: RecordQuery,
        limit: Option<u64>,
    ) -> impl Stream<Item = Result<Vec<SourceRow>>> + '_ {
        let page_size = self.settings.page_size.max(1);
        let state = PageState {
            query,
            after_id: None,
            remaining: limit,
            done: false,
        };

        stream::try_unfold(state, move |mut state| async move {
            if state.done || state.remaining == Some(0) {
                return Ok(None);
            }

            let take = state.remaining.map_or(page_size, |r| r.min(page_size));
            let mut page_query = state.query.clone().with_limit(take);
            if let Some(after_id) = state.after_id {
                page_query = page_query.with_after_id(after_id).with_offset(0);
            }

            let rows = self.source.fetch_rows(&page_query).await?;
            let fetched = rows.len() as u64;
            state.done = fetched < take;
            state.remaining = state.remaining.map(|r| r.saturating_sub(fetched));
            state.after_id = rows.last().map(|r| r.id).or(state.after_id);

            if rows.is_empty() {
                Ok(None)
            } else {
                Ok(Some((rows, state)))
            }
        })
    }
}

fn incremental_filter(descriptor: &DatatypeDescriptor, cursor: &ExportCursor) -> RecordFilter {
    match descriptor.incremental_strategy() {
        IncrementalStrategy::Timestamp(_) if cursor.last_exported_time == 0 => RecordFilter::None,
        IncrementalStrategy::Timestamp(column) => RecordFilter::ModifiedAfter {
            column,
            since: cursor.last_exported_time,
        },
        IncrementalStrategy::IdFilter => RecordFilter::IdAfter(cursor.last_exported_id),
        IncrementalStrategy::Full => RecordFilter::None,
    }
}

fn row_crud(descriptor: &DatatypeDescriptor, cursor: &ExportCursor, params: ExportParams, row: &SourceRow) -> Crud {
    if params.window.is_some() || cursor.last_exported_time == 0 {
        return Crud::Created;
    }
    match descriptor.incremental_strategy() {
        IncrementalStrategy::Timestamp(_) => match row.get_i64("timecreated") {
            Some(created) if created > cursor.last_exported_time => Crud::Created,
            _ => Crud::Updated,
        },
        IncrementalStrategy::IdFilter | IncrementalStrategy::Full => Crud::Created,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DatatypeName, TransformKind};

    fn courses() -> DatatypeDescriptor {
        DatatypeDescriptor::builder(DatatypeName::new("courses").unwrap(), TransformKind::Course)
            .table("course")
            .change_tracking_field("timemodified")
            .build()
    }

    fn row(id: i64, timecreated: i64) -> SourceRow {
        let values = serde_json::json!({"id": id, "timecreated": timecreated});
        SourceRow::from_values(values.as_object().unwrap().clone()).unwrap()
    }

    #[test]
    fn test_first_timestamp_pass_reads_everything() {
        let cursor = ExportCursor::new(DatatypeName::new("courses").unwrap());
        assert_eq!(incremental_filter(&courses(), &cursor), RecordFilter::None);

        let mut seen = cursor.clone();
        seen.last_exported_time = 500;
        assert_eq!(
            incremental_filter(&courses(), &seen),
            RecordFilter::ModifiedAfter {
                column: "timemodified".to_string(),
                since: 500
            }
        );
    }

    #[test]
    fn test_crud_marker_rules() {
        let descriptor = courses();
        let mut cursor = ExportCursor::new(DatatypeName::new("courses").unwrap());
        assert_eq!(row_crud(&descriptor, &cursor, ExportParams::incremental(), &row(1, 10)), Crud::Created);

        cursor.last_exported_time = 100;
        assert_eq!(row_crud(&descriptor, &cursor, ExportParams::incremental(), &row(1, 10)), Crud::Updated);
        assert_eq!(row_crud(&descriptor, &cursor, ExportParams::incremental(), &row(2, 150)), Crud::Created);
        assert_eq!(row_crud(&descriptor, &cursor, ExportParams::window(0, 10), &row(1, 10)), Crud::Created);

        let by_id = DatatypeDescriptor::builder(DatatypeName::new("activities").unwrap(), TransformKind::Activity)
            .table("course_modules")
            .filter_by_id(true)
            .build();
        assert_eq!(row_crud(&by_id, &cursor, ExportParams::incremental(), &row(3, 10)), Crud::Created);
    }
}
