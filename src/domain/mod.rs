//! Domain models and types for Harvest.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`DatatypeName`])
//! - **Datatype descriptors** ([`DatatypeDescriptor`]) describing every exportable entity
//! - **Pipeline records** ([`SourceRow`], [`OutputRecord`], [`BufferedRecord`], [`ExportArtifact`])
//! - **Error types** ([`HarvestError`]) and the [`Result`] alias
//!
//! # Builder Pattern
//!
//! ```rust
//! use harvest::domain::{DatatypeDescriptor, DatatypeName, TransformKind};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptor = DatatypeDescriptor::builder(DatatypeName::new("courses")?, TransformKind::Course)
//!     .table("course")
//!     .change_tracking_field("timemodified")
//!     .build();
//! assert_eq!(descriptor.source_table(), Some("course"));
//! # Ok(())
//! # }
//! ```

pub mod datatype;
pub mod errors;
pub mod ids;
pub mod record;
pub mod result;

// Re-export commonly used types for convenience
pub use datatype::{
    DataSource, DatatypeDescriptor, DatatypeDescriptorBuilder, FieldDef, FieldKind,
    IncrementalStrategy, RowFilter, StorageKind, TableType, TransformKind,
};
pub use errors::HarvestError;
pub use ids::DatatypeName;
pub use record::{
    BufferedRecord, Crud, ExportArtifact, OutputRecord, SerializationFormat, SourceRow,
};
pub use result::Result;
