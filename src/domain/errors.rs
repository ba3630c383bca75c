//! Domain error types
//!
//! This module defines the error hierarchy for Harvest.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main Harvest error type
///
/// This is the primary error type used throughout the application.
/// Each variant maps onto one class of failure the pipeline distinguishes:
/// store errors abort the pass, transform and storage errors are fatal for
/// the current batch, configuration errors are rejected before any side effect.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Relational store errors (connection drops, failed queries)
    #[error("Database error: {0}")]
    Database(String),

    /// Cursor, snapshot or settings persistence errors
    #[error("State management error: {0}")]
    State(String),

    /// A single row could not be turned into an output record
    #[error("Transform error for datatype '{datatype}' (row id {row_id}): {message}")]
    Transform {
        /// Datatype being exported
        datatype: String,
        /// Source row id that failed
        row_id: i64,
        /// What went wrong
        message: String,
    },

    /// Storage backend write errors (disk full, staging insert failure)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested datatype is not part of the registry
    #[error("Unknown datatype: {0}")]
    UnknownDatatype(String),

    /// Requested datatype exists but is disabled
    #[error("Datatype is disabled: {0}")]
    DisabledDatatype(String),

    /// Another exporter is already running for the datatype
    #[error("Export task already in flight for datatype: {0}")]
    TaskInFlight(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl HarvestError {
    /// Builds a transform error for a specific row
    pub fn transform(datatype: impl Into<String>, row_id: i64, message: impl Into<String>) -> Self {
        Self::Transform {
            datatype: datatype.into(),
            row_id,
            message: message.into(),
        }
    }

    /// Whether the error was raised before any side effect took place
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnknownDatatype(_)
                | Self::DisabledDatatype(_)
                | Self::TaskInFlight(_)
                | Self::Validation(_)
        )
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for HarvestError {
    fn from(err: csv::Error) -> Self {
        HarvestError::Serialization(format!("CSV error: {err}"))
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for HarvestError {
    fn from(err: toml::de::Error) -> Self {
        HarvestError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<tokio_postgres::Error> for HarvestError {
    fn from(err: tokio_postgres::Error) -> Self {
        HarvestError::Database(err.to_string())
    }
}
