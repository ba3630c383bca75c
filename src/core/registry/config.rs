//! Persisted per-datatype overrides and log datatype definitions

use crate::domain::{DatatypeName, StorageKind, TableType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Log table used when a log datatype does not name one
pub const DEFAULT_LOG_TABLE: &str = "logstore_standard_log";

/// Whether a datatype is exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatatypeStatus {
    Enabled,
    Disabled,
}

impl fmt::Display for DatatypeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => f.write_str("enabled"),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}

impl FromStr for DatatypeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" | "1" => Ok(Self::Enabled),
            "disabled" | "0" => Ok(Self::Disabled),
            other => Err(format!("Unknown datatype status: {other}")),
        }
    }
}

/// Override row stored in `harvest_config`
///
/// Created with computed defaults the first time the registry sees a
/// datatype, then edited by administrators. The registry never overwrites an
/// existing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatatypeConfig {
    pub datatype: DatatypeName,
    pub status: DatatypeStatus,
    pub table_type: TableType,
    pub timemodified_field: Option<String>,
    pub filter_by_id: bool,
    pub rewritable: bool,
    pub storage: StorageKind,
    pub time_created: i64,
    pub time_modified: i64,
}

impl DatatypeConfig {
    pub fn is_enabled(&self) -> bool {
        self.status == DatatypeStatus::Enabled
    }
}

/// A log-style datatype configured in `harvest_logs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDatatypeDef {
    pub name: DatatypeName,
    /// Unprefixed log table
    pub log_table: String,
    /// Accepted `eventname` values
    pub events: Vec<String>,
}

impl LogDatatypeDef {
    pub fn new(name: DatatypeName, events: Vec<String>) -> Self {
        Self {
            name,
            log_table: DEFAULT_LOG_TABLE.to_string(),
            events,
        }
    }
}
