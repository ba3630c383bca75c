//! Data transformation logic
//!
//! Rows read from the store are turned into output records by an
//! [`EntityTransform`] and then serialized to lines by [`format`]:
//!
//! - **JSON**: one object per line with a trailing `crud` key
//! - **CSV**: declared fields in order, then the crud marker

pub mod entities;
pub mod format;

pub use entities::{declared_fields, redact_ip, truncate_text, EntityTransform, FieldSource, OutputField};
pub use format::{csv_header, decode, encode, CRUD_FIELD, CSV_NULL};

use crate::domain::{Crud, DatatypeDescriptor, OutputRecord, Result, SourceRow};

/// Transform a source row into an output record
///
/// # Examples
///
/// ```
/// use harvest::core::transform::{declared_fields, transform_row, EntityTransform};
/// use harvest::domain::{Crud, DatatypeDescriptor, DatatypeName, SourceRow, TransformKind};
/// use serde_json::json;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let descriptor = DatatypeDescriptor::builder(DatatypeName::new("trackinglog")?, TransformKind::TrackingLog)
///     .fields(declared_fields(TransformKind::TrackingLog))
///     .build();
/// let transform = EntityTransform::for_descriptor(&descriptor, 10_000);
/// let row = SourceRow::from_values(
///     json!({"id": 1, "userid": 2, "courseid": 3, "visits": 4, "lastaccess": 5})
///         .as_object()
///         .cloned()
///         .unwrap_or_default(),
/// )?;
///
/// let record = transform_row(&descriptor, &transform, &row, Crud::Created)?;
/// assert_eq!(record.values["visits"], json!(4));
/// # Ok(())
/// # }
/// ```
pub fn transform_row(
    descriptor: &DatatypeDescriptor,
    transform: &EntityTransform,
    row: &SourceRow,
    crud: Crud,
) -> Result<OutputRecord> {
    Ok(OutputRecord {
        datatype: descriptor.name.clone(),
        crud,
        id: row.id,
        values: transform.apply(row)?,
    })
}
