//! Export orchestration
//!
//! This module provides the core export logic for Harvest, including:
//! - Per-datatype batch export ([`RecordExporter`])
//! - Catalogue runs ([`ExportCoordinator`]) under per-datatype [`TaskGuard`] markers
//! - Change capture from host notifications ([`ChangeRouter`])
//! - Summary and reporting

pub mod coordinator;
pub mod exporter;
pub mod guard;
pub mod observer;
pub mod summary;

pub use coordinator::ExportCoordinator;
pub use exporter::{BatchOutcome, ExportParams, ExportWindow, ExporterSettings, RecordExporter};
pub use guard::TaskGuard;
pub use observer::{ChangeObserver, ChangeOperation, ChangeRouter, DatatypeObserver};
pub use summary::{DatatypeOutcome, ExportError, ExportErrorType, ExportSummary};
