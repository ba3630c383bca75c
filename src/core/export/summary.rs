//! Export summary and reporting
//!
//! This module defines structures for tracking and reporting export results.

use crate::domain::{DatatypeName, ExportArtifact, HarvestError};
use std::time::Duration;

/// Outcome of one datatype within a run
#[derive(Debug, Clone)]
pub struct DatatypeOutcome {
    pub datatype: DatatypeName,

    /// Records appended to storage, deletions included
    pub records_exported: u64,

    /// Deletions detected by id diffing
    pub deleted: u64,

    /// Artifact produced by packaging, if anything was buffered
    pub artifact: Option<ExportArtifact>,
}

/// Summary of an export operation
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Number of datatypes considered
    pub total_datatypes: usize,

    /// Datatypes exported successfully
    pub datatypes: Vec<DatatypeOutcome>,

    /// Datatypes skipped (not yet migrated, already running)
    pub skipped: Vec<(DatatypeName, String)>,

    /// Duration of the export
    pub duration: Duration,

    /// Errors encountered during export
    pub errors: Vec<ExportError>,

    /// Whether the run stopped early on a shutdown signal
    pub interrupted: bool,
}

impl ExportSummary {
    /// Create a new empty export summary
    pub fn new() -> Self {
        Self {
            total_datatypes: 0,
            datatypes: Vec::new(),
            skipped: Vec::new(),
            duration: Duration::from_secs(0),
            errors: Vec::new(),
            interrupted: false,
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Add an error
    pub fn add_error(&mut self, error: ExportError) {
        self.errors.push(error);
    }

    pub fn add_outcome(&mut self, outcome: DatatypeOutcome) {
        self.datatypes.push(outcome);
    }

    pub fn skip(&mut self, datatype: DatatypeName, reason: impl Into<String>) {
        self.skipped.push((datatype, reason.into()));
    }

    pub fn total_records(&self) -> u64 {
        self.datatypes.iter().map(|d| d.records_exported).sum()
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &ExportArtifact> {
        self.datatypes.iter().filter_map(|d| d.artifact.as_ref())
    }

    /// Check if the export was successful (no failures)
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            total_datatypes = self.total_datatypes,
            exported = self.datatypes.len(),
            skipped = self.skipped.len(),
            failed = self.errors.len(),
            records = self.total_records(),
            artifacts = self.artifacts().count(),
            interrupted = self.interrupted,
            duration_secs = self.duration.as_secs(),
            "Export completed"
        );

        if !self.errors.is_empty() {
            tracing::warn!(
                error_count = self.errors.len(),
                "Export completed with errors"
            );
            for error in &self.errors {
                tracing::warn!(
                    error_type = ?error.error_type,
                    datatype = error.datatype.as_ref().map(|d| d.as_str()).unwrap_or("-"),
                    message = %error.message,
                    "Export error"
                );
            }
        }
    }
}

impl Default for ExportSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Type of export error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportErrorType {
    /// Relational store error
    Database,
    /// Row could not be transformed
    Transformation,
    /// Storage backend or artifact write error
    Storage,
    /// Cursor or snapshot persistence error
    State,
    /// Configuration error
    Configuration,
    /// Unknown error
    Unknown,
}

impl From<&HarvestError> for ExportErrorType {
    fn from(err: &HarvestError) -> Self {
        match err {
            HarvestError::Database(_) => Self::Database,
            HarvestError::Transform { .. } => Self::Transformation,
            HarvestError::Storage(_) | HarvestError::Io(_) | HarvestError::Serialization(_) => Self::Storage,
            HarvestError::State(_) => Self::State,
            HarvestError::Configuration(_)
            | HarvestError::UnknownDatatype(_)
            | HarvestError::DisabledDatatype(_)
            | HarvestError::Validation(_) => Self::Configuration,
            HarvestError::TaskInFlight(_) => Self::Unknown,
        }
    }
}

/// Export error with context
#[derive(Debug, Clone)]
pub struct ExportError {
    /// Type of error
    pub error_type: ExportErrorType,

    /// Error message
    pub message: String,

    /// Datatype the error belongs to
    pub datatype: Option<DatatypeName>,
}

impl ExportError {
    /// Create a new export error
    pub fn new(error_type: ExportErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            datatype: None,
        }
    }

    /// Classify a pipeline error for a datatype
    pub fn from_error(datatype: &DatatypeName, err: &HarvestError) -> Self {
        Self::new(ExportErrorType::from(err), err.to_string()).with_datatype(datatype.clone())
    }

    pub fn with_datatype(mut self, datatype: DatatypeName) -> Self {
        self.datatype = Some(datatype);
        self
    }
}
