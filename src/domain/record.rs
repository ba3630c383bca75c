//! Records flowing through the export pipeline
//!
//! Raw [`SourceRow`]s are read from the store, turned into [`OutputRecord`]s
//! by an entity transform, serialized into [`BufferedRecord`]s and finally
//! packaged into [`ExportArtifact`]s.

use crate::domain::ids::DatatypeName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Change marker attached to every exported record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Crud {
    #[serde(rename = "c")]
    Created,
    #[serde(rename = "u")]
    Updated,
    #[serde(rename = "d")]
    Deleted,
}

impl Crud {
    /// Single-letter wire marker
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "c",
            Self::Updated => "u",
            Self::Deleted => "d",
        }
    }
}

impl fmt::Display for Crud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Crud {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" | "create" | "created" => Ok(Self::Created),
            "u" | "update" | "updated" => Ok(Self::Updated),
            "d" | "delete" | "deleted" => Ok(Self::Deleted),
            other => Err(format!("Unknown crud marker: {other}")),
        }
    }
}

/// Output serialization format, fixed per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// One CSV record per line, fields in declared order
    Csv,
}

impl SerializationFormat {
    /// File extension for artifacts in this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for SerializationFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!(
                "Invalid export format: {other}. Expected 'json' or 'csv'"
            )),
        }
    }
}

/// A raw row read from the relational store
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Primary key
    pub id: i64,
    /// Column values, keyed by column name (includes `id`)
    pub values: Map<String, Value>,
}

impl SourceRow {
    /// Builds a row from its column map
    ///
    /// # Errors
    ///
    /// Returns an error if the map has no integer `id` column.
    pub fn from_values(values: Map<String, Value>) -> Result<Self, String> {
        let id = values
            .get("id")
            .and_then(value_as_i64)
            .ok_or_else(|| "row has no integer 'id' column".to_string())?;
        Ok(Self { id, values })
    }

    /// Reads a column as an integer, accepting numeric strings
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.values.get(column).and_then(value_as_i64)
    }

    /// Reads a column as text
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(Value::as_str)
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// A normalized record produced by an entity transform
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    /// Source datatype
    pub datatype: DatatypeName,
    /// Change marker
    pub crud: Crud,
    /// Source row id
    pub id: i64,
    /// Declared field values
    pub values: Map<String, Value>,
}

impl OutputRecord {
    /// Builds the id-only record exported for a deleted row
    pub fn deleted(datatype: DatatypeName, id: i64) -> Self {
        let mut values = Map::new();
        values.insert("id".to_string(), Value::from(id));
        Self {
            datatype,
            crud: Crud::Deleted,
            id,
            values,
        }
    }
}

/// A serialized record waiting in a storage backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedRecord {
    /// Source datatype
    pub datatype: DatatypeName,
    /// Change marker
    pub crud: Crud,
    /// Source row id
    pub data_id: i64,
    /// Serialized line without trailing newline
    pub line: String,
}

/// A delivered export file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportArtifact {
    /// Monotonic pickup id
    pub id: i64,
    /// Source datatype
    pub datatype: DatatypeName,
    /// Random file name
    pub filename: String,
    /// Location on disk
    pub path: PathBuf,
    /// Serialization format of the content
    pub format: SerializationFormat,
    /// Number of records in the file
    pub record_count: u64,
    /// File size in bytes
    pub size_bytes: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crud_markers() {
        assert_eq!(Crud::Created.as_str(), "c");
        assert_eq!(Crud::from_str("update").unwrap(), Crud::Updated);
        assert_eq!(Crud::from_str("d").unwrap(), Crud::Deleted);
        assert!(Crud::from_str("x").is_err());
        assert_eq!(serde_json::to_string(&Crud::Deleted).unwrap(), "\"d\"");
    }

    #[test]
    fn test_source_row_requires_id() {
        let values = json!({"id": 7, "username": "ann"});
        let row = SourceRow::from_values(values.as_object().unwrap().clone()).unwrap();
        assert_eq!(row.id, 7);
        assert_eq!(row.get_str("username"), Some("ann"));

        let missing = json!({"username": "bob"});
        assert!(SourceRow::from_values(missing.as_object().unwrap().clone()).is_err());
    }

    #[test]
    fn test_source_row_numeric_strings() {
        let values = json!({"id": "12", "timemodified": "1700000000"});
        let row = SourceRow::from_values(values.as_object().unwrap().clone()).unwrap();
        assert_eq!(row.id, 12);
        assert_eq!(row.get_i64("timemodified"), Some(1_700_000_000));
    }

    #[test]
    fn test_deleted_record_is_id_only() {
        let record = OutputRecord::deleted(DatatypeName::new("groups").unwrap(), 2);
        assert_eq!(record.crud, Crud::Deleted);
        assert_eq!(record.values.len(), 1);
        assert_eq!(record.values["id"], json!(2));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!(SerializationFormat::from_str("CSV").unwrap(), SerializationFormat::Csv);
        assert_eq!(SerializationFormat::from_str("jsonl").unwrap(), SerializationFormat::Json);
        assert!(SerializationFormat::from_str("xml").is_err());
    }
}
