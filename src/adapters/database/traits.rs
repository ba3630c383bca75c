//! Database abstraction traits
//!
//! This module defines the traits that store adapters must implement to work
//! with Harvest. Every piece of persisted state is reached through one of
//! these seams, so the pipeline can run against PostgreSQL or the in-memory
//! adapter alike.

use crate::core::registry::config::{DatatypeConfig, LogDatatypeDef};
use crate::core::state::cursor::ExportCursor;
use crate::core::state::snapshot::SnapshotChange;
use crate::domain::{
    BufferedRecord, DataSource, DatatypeName, ExportArtifact, FieldKind, Result, RowFilter,
    SourceRow,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Introspected column of a source table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// Mapped value kind
    pub kind: FieldKind,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.kind == FieldKind::Integer
    }
}

/// Incremental row filter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecordFilter {
    /// Every row
    #[default]
    None,

    /// `column > since`
    ModifiedAfter { column: String, since: i64 },

    /// `id > last_id`
    IdAfter(i64),
}

/// A read against a datatype source, always ordered by `id` ascending
///
/// # Examples
///
/// ```
/// use harvest::adapters::database::traits::{RecordFilter, RecordQuery};
/// use harvest::domain::DataSource;
///
/// let query = RecordQuery::new(DataSource::Table("user".to_string()))
///     .with_filter(RecordFilter::ModifiedAfter {
///         column: "timemodified".to_string(),
///         since: 1_700_000_000,
///     })
///     .with_limit(500);
/// assert_eq!(query.limit, Some(500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Table or computed query
    pub source: DataSource,

    /// Fixed `column IN (...)` filters
    pub conditions: Vec<RowFilter>,

    /// Incremental filter
    pub filter: RecordFilter,

    /// Keyset position: only rows with `id > after_id`
    pub after_id: Option<i64>,

    /// Only rows with `id <= up_to_id` (used for progress counts)
    pub up_to_id: Option<i64>,

    /// Rows skipped after filtering
    pub offset: u64,

    /// Maximum number of rows returned
    pub limit: Option<u64>,
}

impl RecordQuery {
    pub fn new(source: DataSource) -> Self {
        Self {
            source,
            conditions: Vec::new(),
            filter: RecordFilter::None,
            after_id: None,
            up_to_id: None,
            offset: 0,
            limit: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<RowFilter>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_after_id(mut self, after_id: i64) -> Self {
        self.after_id = Some(after_id);
        self
    }

    pub fn with_up_to_id(mut self, up_to_id: i64) -> Self {
        self.up_to_id = Some(up_to_id);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A record held in the staging table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRecord {
    /// Staging row id, monotonic per store
    pub id: i64,

    /// Serialized line
    pub line: String,
}

/// Artifact listing filter for the pickup API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactFilter {
    pub datatype: Option<DatatypeName>,

    /// Only artifacts created strictly after this instant
    pub since_time: Option<DateTime<Utc>>,

    /// Only artifacts with an id strictly greater than this one
    pub since_id: Option<i64>,
}

/// Read access to the LMS relational store
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// List unprefixed table names
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Describe the columns of a table
    ///
    /// Returns an empty list if the table does not exist.
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Fetch rows matching the query, ordered by id ascending
    async fn fetch_rows(&self, query: &RecordQuery) -> Result<Vec<SourceRow>>;

    /// Count rows matching the query, ignoring offset, limit and keyset position
    async fn count_rows(&self, query: &RecordQuery) -> Result<u64>;

    /// Every id currently present in a table
    async fn fetch_ids(&self, table: &str) -> Result<Vec<i64>>;
}

/// State storage trait for cursor and id-snapshot persistence
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Load the cursor of a datatype
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if the datatype was never exported.
    async fn load_cursor(&self, datatype: &DatatypeName) -> Result<Option<ExportCursor>>;

    /// Upsert a cursor
    async fn save_cursor(&self, cursor: &ExportCursor) -> Result<()>;

    /// Upsert a cursor and apply a snapshot change in one transaction
    ///
    /// # Errors
    ///
    /// On error neither the cursor nor the snapshot is modified.
    async fn commit_batch(
        &self,
        cursor: &ExportCursor,
        snapshot: Option<&SnapshotChange>,
    ) -> Result<()>;

    /// Every stored cursor, ordered by datatype
    async fn all_cursors(&self) -> Result<Vec<ExportCursor>>;

    /// Zero every stored cursor
    async fn reset_cursors(&self) -> Result<()>;

    /// Ids recorded in the snapshot of a datatype
    async fn snapshot_ids(&self, datatype: &DatatypeName) -> Result<Vec<i64>>;
}

/// Key/value settings store
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Set a value only if the key is absent
    ///
    /// # Returns
    ///
    /// Returns `true` if the value was written.
    async fn set_setting_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    async fn delete_setting(&self, key: &str) -> Result<()>;

    /// Write several values atomically
    async fn set_settings(&self, entries: &[(&str, &str)]) -> Result<()>;

    /// Delete a key only while it still holds `expected`
    ///
    /// # Returns
    ///
    /// Returns `true` if the row was deleted.
    async fn delete_setting_if(&self, key: &str, expected: &str) -> Result<bool>;
}

/// Datatype override and log configuration storage
#[async_trait]
pub trait DatatypeConfigStorage: Send + Sync {
    async fn load_datatype_config(&self, datatype: &DatatypeName)
        -> Result<Option<DatatypeConfig>>;

    async fn save_datatype_config(&self, config: &DatatypeConfig) -> Result<()>;

    /// Enabled log datatype definitions
    async fn list_log_datatypes(&self) -> Result<Vec<LogDatatypeDef>>;
}

/// Append-only staging table used by the database-buffered backend
#[async_trait]
pub trait StagingStorage: Send + Sync {
    /// Insert a record, returning its staging id
    async fn insert_staged(&self, record: &BufferedRecord) -> Result<i64>;

    /// Highest staging id currently held for a datatype
    async fn max_staged_id(&self, datatype: &DatatypeName) -> Result<Option<i64>>;

    /// Staged records with `after_id < id <= up_to_id`, ordered by id
    async fn fetch_staged(
        &self,
        datatype: &DatatypeName,
        after_id: i64,
        up_to_id: i64,
        limit: u64,
    ) -> Result<Vec<StagedRecord>>;

    /// Delete staged records with `id <= up_to_id`
    async fn purge_staged(&self, datatype: &DatatypeName, up_to_id: i64) -> Result<u64>;

    /// Delete every staged record of a datatype
    async fn delete_staged(&self, datatype: &DatatypeName) -> Result<u64>;
}

/// Index of delivered artifacts
#[async_trait]
pub trait ArtifactIndex: Send + Sync {
    /// Register an artifact; the stored id is assigned by the index
    async fn insert_artifact(&self, artifact: &ExportArtifact) -> Result<i64>;

    /// Artifacts matching the filter, ordered by id
    async fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<ExportArtifact>>;

    /// Remove every artifact of a datatype from the index, returning them
    async fn delete_artifacts(&self, datatype: &DatatypeName) -> Result<Vec<ExportArtifact>>;
}
