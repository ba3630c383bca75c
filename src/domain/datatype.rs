//! Datatype descriptors
//!
//! A [`DatatypeDescriptor`] is the immutable description of one exportable
//! entity: where its rows come from, how changes are tracked, which transform
//! serializes it and where its output is buffered.

use crate::domain::ids::DatatypeName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output classification of a datatype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    /// Hard-coded entities every deployment exports
    Required,
    /// Entities discovered from the live schema
    Optional,
    /// Log-style entities configured in the log configuration table
    Logs,
}

impl TableType {
    /// Returns the persisted label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Logs => "logs",
        }
    }
}

impl FromStr for TableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(Self::Required),
            "optional" => Ok(Self::Optional),
            "logs" => Ok(Self::Logs),
            other => Err(format!("Unknown table type: {other}")),
        }
    }
}

/// Value kind of a declared output field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// 64-bit integer
    Integer,
    /// Floating point number
    Number,
    /// Free text
    Text,
    /// Boolean flag
    Boolean,
}

/// A declared output field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name in the output record
    pub name: String,
    /// Value kind, used to parse CSV back into typed values
    pub kind: FieldKind,
}

impl FieldDef {
    /// Creates a field definition
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Where a datatype's rows come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum DataSource {
    /// A plain table (unprefixed name)
    Table(String),
    /// A computed query; must yield an integer `id` column
    Query(String),
}

/// Fixed row filter: `column IN (values)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    /// Column to filter on
    pub column: String,
    /// Accepted values
    pub values: Vec<String>,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Local temp-file buffer
    File,
    /// Append-only staging table
    #[default]
    Database,
}

impl StorageKind {
    /// Returns the persisted label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Database => "database",
        }
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "database" | "db" => Ok(Self::Database),
            other => Err(format!(
                "Invalid storage kind: {other}. Expected 'file' or 'database'"
            )),
        }
    }
}

/// Static tag selecting an entity transform
///
/// Each tag is resolved to one transform implementation when the registry is
/// assembled; nothing is looked up by name at export time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    User,
    Category,
    Course,
    Enrolment,
    RoleAssignment,
    Group,
    GroupMember,
    Activity,
    GradeItem,
    Grade,
    ForumPost,
    QuizAttempt,
    TrackingLog,
    /// Log-table row filtered by event name
    LogEvent,
    /// Pass-through of every declared column
    Generic,
}

/// How new rows are selected on an incremental pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementalStrategy {
    /// `timestamp_field > last_exported_time`
    Timestamp(String),
    /// `id > last_exported_id`
    IdFilter,
    /// Every row, every pass
    Full,
}

/// Immutable description of one exportable entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatatypeDescriptor {
    /// Unique key
    pub name: DatatypeName,
    /// Output classification
    pub table_type: TableType,
    /// Row source (None for datatypes fed only by change notifications)
    pub source: Option<DataSource>,
    /// Timestamp column used for change tracking
    pub change_tracking_field: Option<String>,
    /// Whether deletions are detected by diffing id snapshots
    pub uses_id_diff: bool,
    /// Whether incremental passes filter by `id > last_exported_id`
    pub filter_by_id: bool,
    /// Whether a new artifact replaces all previous ones
    pub rewritable_on_export: bool,
    /// Entity transform tag
    pub transform: TransformKind,
    /// Whether the database-buffered backend may be used
    pub database_export_eligible: bool,
    /// Declared output fields, in output order
    pub fields: Vec<FieldDef>,
    /// Fixed row filters
    pub conditions: Vec<RowFilter>,
    /// Selected storage backend
    pub storage: StorageKind,
}

impl DatatypeDescriptor {
    /// Starts building a descriptor
    pub fn builder(name: DatatypeName, transform: TransformKind) -> DatatypeDescriptorBuilder {
        DatatypeDescriptorBuilder::new(name, transform)
    }

    /// Source table name if the datatype is table-backed
    pub fn source_table(&self) -> Option<&str> {
        match &self.source {
            Some(DataSource::Table(table)) => Some(table),
            _ => None,
        }
    }

    /// Whether the datatype reads from a computed query
    pub fn is_query_backed(&self) -> bool {
        matches!(self.source, Some(DataSource::Query(_)))
    }

    /// Whether the id-diff reconciler runs for this datatype
    ///
    /// Query-backed datatypes never reconcile ids, whatever their flag says.
    pub fn reconciles_ids(&self) -> bool {
        self.uses_id_diff && self.source_table().is_some()
    }

    /// Incremental selection strategy
    ///
    /// A configured timestamp field wins over id filtering; the choice is made
    /// by configuration, never inferred from the data.
    pub fn incremental_strategy(&self) -> IncrementalStrategy {
        match (&self.change_tracking_field, self.filter_by_id) {
            (Some(field), _) => IncrementalStrategy::Timestamp(field.clone()),
            (None, true) => IncrementalStrategy::IdFilter,
            (None, false) => IncrementalStrategy::Full,
        }
    }

    /// Backend actually used, honouring database eligibility
    pub fn effective_storage(&self) -> StorageKind {
        if self.database_export_eligible {
            self.storage
        } else {
            StorageKind::File
        }
    }

    /// Names of the declared fields, in output order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

impl fmt::Display for DatatypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.table_type.as_str())
    }
}

/// Builder for [`DatatypeDescriptor`]
pub struct DatatypeDescriptorBuilder {
    descriptor: DatatypeDescriptor,
}

impl DatatypeDescriptorBuilder {
    fn new(name: DatatypeName, transform: TransformKind) -> Self {
        Self {
            descriptor: DatatypeDescriptor {
                name,
                table_type: TableType::Required,
                source: None,
                change_tracking_field: None,
                uses_id_diff: false,
                filter_by_id: false,
                rewritable_on_export: false,
                transform,
                database_export_eligible: true,
                fields: Vec::new(),
                conditions: Vec::new(),
                storage: StorageKind::default(),
            },
        }
    }

    pub fn table_type(mut self, table_type: TableType) -> Self {
        self.descriptor.table_type = table_type;
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.descriptor.source = Some(DataSource::Table(table.into()));
        self
    }

    pub fn query(mut self, sql: impl Into<String>) -> Self {
        self.descriptor.source = Some(DataSource::Query(sql.into()));
        self
    }

    pub fn change_tracking_field(mut self, field: impl Into<String>) -> Self {
        self.descriptor.change_tracking_field = Some(field.into());
        self
    }

    pub fn uses_id_diff(mut self, enabled: bool) -> Self {
        self.descriptor.uses_id_diff = enabled;
        self
    }

    pub fn filter_by_id(mut self, enabled: bool) -> Self {
        self.descriptor.filter_by_id = enabled;
        self
    }

    pub fn rewritable(mut self, enabled: bool) -> Self {
        self.descriptor.rewritable_on_export = enabled;
        self
    }

    pub fn database_export_eligible(mut self, enabled: bool) -> Self {
        self.descriptor.database_export_eligible = enabled;
        self
    }

    pub fn fields(mut self, fields: Vec<FieldDef>) -> Self {
        self.descriptor.fields = fields;
        self
    }

    pub fn condition(mut self, column: impl Into<String>, values: Vec<String>) -> Self {
        self.descriptor.conditions.push(RowFilter {
            column: column.into(),
            values,
        });
        self
    }

    pub fn storage(mut self, storage: StorageKind) -> Self {
        self.descriptor.storage = storage;
        self
    }

    pub fn build(self) -> DatatypeDescriptor {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DatatypeName {
        DatatypeName::new(s).unwrap()
    }

    #[test]
    fn test_incremental_strategy_precedence() {
        let both = DatatypeDescriptor::builder(name("courses"), TransformKind::Course)
            .table("course")
            .change_tracking_field("timemodified")
            .filter_by_id(true)
            .build();
        assert_eq!(
            both.incremental_strategy(),
            IncrementalStrategy::Timestamp("timemodified".to_string())
        );

        let by_id = DatatypeDescriptor::builder(name("activities"), TransformKind::Activity)
            .table("course_modules")
            .filter_by_id(true)
            .build();
        assert_eq!(by_id.incremental_strategy(), IncrementalStrategy::IdFilter);

        let full = DatatypeDescriptor::builder(name("members"), TransformKind::GroupMember)
            .table("groups_members")
            .build();
        assert_eq!(full.incremental_strategy(), IncrementalStrategy::Full);
    }

    #[test]
    fn test_query_backed_never_reconciles_ids() {
        let descriptor = DatatypeDescriptor::builder(name("trackinglog"), TransformKind::TrackingLog)
            .query("SELECT id, userid FROM logstore_standard_log")
            .uses_id_diff(true)
            .build();
        assert!(descriptor.is_query_backed());
        assert!(!descriptor.reconciles_ids());

        let table_backed = DatatypeDescriptor::builder(name("members"), TransformKind::GroupMember)
            .table("groups_members")
            .uses_id_diff(true)
            .build();
        assert!(table_backed.reconciles_ids());
    }

    #[test]
    fn test_effective_storage_honours_eligibility() {
        let descriptor = DatatypeDescriptor::builder(name("users"), TransformKind::User)
            .storage(StorageKind::Database)
            .database_export_eligible(false)
            .build();
        assert_eq!(descriptor.effective_storage(), StorageKind::File);
    }

    #[test]
    fn test_storage_kind_from_str() {
        assert_eq!(StorageKind::from_str("file").unwrap(), StorageKind::File);
        assert_eq!(StorageKind::from_str("DB").unwrap(), StorageKind::Database);
        assert!(StorageKind::from_str("s3").is_err());
    }
}
