//! Database abstraction layer
//!
//! This module provides a trait-based abstraction for every store Harvest
//! reads from or writes to, allowing the pipeline to run against PostgreSQL
//! or the in-memory adapter.

pub mod factory;
pub mod traits;

pub use factory::{create_stores, Stores};
pub use traits::{
    ArtifactFilter, ArtifactIndex, ColumnInfo, DatatypeConfigStorage, RecordFilter, RecordQuery,
    SettingsStore, SourceStore, StagedRecord, StagingStorage, StateStorage,
};
