//! PostgreSQL row models
//!
//! Each struct mirrors one bookkeeping table and converts to and from the
//! domain type it stores.

use crate::core::registry::config::{DatatypeConfig, DatatypeStatus, LogDatatypeDef};
use crate::core::state::cursor::ExportCursor;
use crate::domain::{
    DatatypeName, ExportArtifact, HarvestError, Result, SerializationFormat, StorageKind,
    TableType,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::str::FromStr;
use tokio_postgres::Row;

fn datatype_name(raw: String) -> Result<DatatypeName> {
    DatatypeName::new(raw).map_err(HarvestError::State)
}

fn non_negative(column: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| HarvestError::State(format!("{column} must be non-negative, got {value}")))
}

/// Row of `harvest_export_log`
#[derive(Debug, Clone)]
pub struct PostgreSQLCursor {
    pub datatype: String,
    pub last_exported_time: i64,
    pub last_exported_id: i64,
    pub records_count: i64,
    pub records_migrated: i64,
    pub migrated: bool,
    pub time_start: i64,
}

impl PostgreSQLCursor {
    pub fn from_row(row: &Row) -> Self {
        Self {
            datatype: row.get("datatype"),
            last_exported_time: row.get("last_exported_time"),
            last_exported_id: row.get("last_exported_id"),
            records_count: row.get("records_count"),
            records_migrated: row.get("records_migrated"),
            migrated: row.get("migrated"),
            time_start: row.get("time_start"),
        }
    }

    pub fn from_domain(cursor: &ExportCursor) -> Self {
        Self {
            datatype: cursor.datatype.to_string(),
            last_exported_time: cursor.last_exported_time,
            last_exported_id: cursor.last_exported_id,
            records_count: cursor.records_count as i64,
            records_migrated: cursor.records_migrated as i64,
            migrated: cursor.migrated,
            time_start: cursor.time_start,
        }
    }

    pub fn to_domain(self) -> Result<ExportCursor> {
        Ok(ExportCursor {
            datatype: datatype_name(self.datatype)?,
            last_exported_time: self.last_exported_time,
            last_exported_id: self.last_exported_id,
            records_count: non_negative("records_count", self.records_count)?,
            records_migrated: non_negative("records_migrated", self.records_migrated)?,
            migrated: self.migrated,
            time_start: self.time_start,
        })
    }
}

/// Row of `harvest_config`
#[derive(Debug, Clone)]
pub struct PostgreSQLDatatypeConfig {
    pub datatype: String,
    pub status: String,
    pub table_type: String,
    pub timemodified_field: Option<String>,
    pub filter_by_id: bool,
    pub rewritable: bool,
    pub storage: String,
    pub time_created: i64,
    pub time_modified: i64,
}

impl PostgreSQLDatatypeConfig {
    pub fn from_row(row: &Row) -> Self {
        Self {
            datatype: row.get("datatype"),
            status: row.get("status"),
            table_type: row.get("table_type"),
            timemodified_field: row.get("timemodified_field"),
            filter_by_id: row.get("filter_by_id"),
            rewritable: row.get("rewritable"),
            storage: row.get("storage"),
            time_created: row.get("time_created"),
            time_modified: row.get("time_modified"),
        }
    }

    pub fn from_domain(config: &DatatypeConfig) -> Self {
        Self {
            datatype: config.datatype.to_string(),
            status: config.status.to_string(),
            table_type: config.table_type.as_str().to_string(),
            timemodified_field: config.timemodified_field.clone(),
            filter_by_id: config.filter_by_id,
            rewritable: config.rewritable,
            storage: config.storage.as_str().to_string(),
            time_created: config.time_created,
            time_modified: config.time_modified,
        }
    }

    pub fn to_domain(self) -> Result<DatatypeConfig> {
        Ok(DatatypeConfig {
            datatype: datatype_name(self.datatype)?,
            status: DatatypeStatus::from_str(&self.status).map_err(HarvestError::State)?,
            table_type: TableType::from_str(&self.table_type).map_err(HarvestError::State)?,
            timemodified_field: self.timemodified_field.filter(|f| !f.is_empty()),
            filter_by_id: self.filter_by_id,
            rewritable: self.rewritable,
            storage: StorageKind::from_str(&self.storage).map_err(HarvestError::State)?,
            time_created: self.time_created,
            time_modified: self.time_modified,
        })
    }
}

/// Row of `harvest_logs`
pub fn log_datatype_from_row(row: &Row) -> Result<LogDatatypeDef> {
    let events: String = row.get("events");
    Ok(LogDatatypeDef {
        name: datatype_name(row.get("datatype"))?,
        log_table: row.get("log_table"),
        events: events
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// Row of `harvest_artifacts`
pub fn artifact_from_row(row: &Row) -> Result<ExportArtifact> {
    let path: String = row.get("path");
    let format: String = row.get("format");
    let created_at: DateTime<Utc> = row.get("created_at");

    Ok(ExportArtifact {
        id: row.get("id"),
        datatype: datatype_name(row.get("datatype"))?,
        filename: row.get("filename"),
        path: PathBuf::from(path),
        format: SerializationFormat::from_str(&format).map_err(HarvestError::State)?,
        record_count: non_negative("record_count", row.get("record_count"))?,
        size_bytes: non_negative("size_bytes", row.get("size_bytes"))?,
        created_at,
    })
}
