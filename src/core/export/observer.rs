//! Change notifications
//!
//! The host delivers `(table, operation, payload)` notifications as rows are
//! created, updated or deleted. A [`ChangeObserver`] registered per datatype
//! turns a notification into an output record; the [`ChangeRouter`]
//! dispatches to the observer of the table and appends the record to
//! storage, bypassing the batch exporter.

use crate::core::registry::Datatypes;
use crate::core::storage::StorageRouter;
use crate::core::transform::{encode, EntityTransform};
use crate::domain::{
    BufferedRecord, Crud, DatatypeDescriptor, HarvestError, OutputRecord, Result,
    SerializationFormat, SourceRow,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn crud(&self) -> Crud {
        match self {
            Self::Create => Crud::Created,
            Self::Update => Crud::Updated,
            Self::Delete => Crud::Deleted,
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

impl FromStr for ChangeOperation {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" | "created" | "c" => Ok(Self::Create),
            "update" | "updated" | "u" => Ok(Self::Update),
            "delete" | "deleted" | "d" => Ok(Self::Delete),
            other => Err(HarvestError::Validation(format!("Unknown change operation: {other}"))),
        }
    }
}

/// Turns change notifications for one table into output records
pub trait ChangeObserver: Send + Sync {
    fn descriptor(&self) -> &DatatypeDescriptor;

    /// `Ok(None)` when the change is not exported by this datatype
    fn on_change(&self, table: &str, operation: ChangeOperation, payload: &Value) -> Result<Option<OutputRecord>>;
}

/// Observer backed by a datatype's entity transform
pub struct DatatypeObserver {
    descriptor: DatatypeDescriptor,
    transform: EntityTransform,
}

impl DatatypeObserver {
    pub fn new(descriptor: DatatypeDescriptor, max_text_length: usize) -> Self {
        let transform = EntityTransform::for_descriptor(&descriptor, max_text_length);
        Self {
            descriptor,
            transform,
        }
    }

    /// `absent_matches` decides conditions whose column the row lacks
    fn matches_conditions(&self, row: &SourceRow, absent_matches: bool) -> bool {
        self.descriptor.conditions.iter().all(|condition| {
            let text = match row.values.get(&condition.column) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                None => return absent_matches,
                _ => return false,
            };
            condition.values.contains(&text)
        })
    }
}

impl ChangeObserver for DatatypeObserver {
    fn descriptor(&self) -> &DatatypeDescriptor {
        &self.descriptor
    }

    fn on_change(&self, table: &str, operation: ChangeOperation, payload: &Value) -> Result<Option<OutputRecord>> {
        if self.descriptor.source_table() != Some(table) {
            return Ok(None);
        }

        let values = payload.as_object().cloned().ok_or_else(|| {
            HarvestError::Validation(format!("Change payload for '{table}' is not an object"))
        })?;
        let row = SourceRow::from_values(values)
            .map_err(|e| HarvestError::Validation(format!("Change payload for '{table}': {e}")))?;

        // Deletes often carry only the id
        let is_delete = operation == ChangeOperation::Delete;
        if !self.matches_conditions(&row, is_delete) {
            return Ok(None);
        }
        if is_delete {
            return Ok(Some(OutputRecord::deleted(self.descriptor.name.clone(), row.id)));
        }

        Ok(Some(OutputRecord {
            datatype: self.descriptor.name.clone(),
            crud: operation.crud(),
            id: row.id,
            values: self.transform.apply(&row)?,
        }))
    }
}

/// Dispatches change notifications to the observers of each table
pub struct ChangeRouter {
    observers: HashMap<String, Vec<Arc<dyn ChangeObserver>>>,
    storage: StorageRouter,
    format: SerializationFormat,
}

impl ChangeRouter {
    pub fn new(storage: StorageRouter, format: SerializationFormat) -> Self {
        Self {
            observers: HashMap::new(),
            storage,
            format,
        }
    }

    /// Registers an observer for every table-backed datatype
    pub fn from_datatypes(
        datatypes: &Datatypes,
        storage: StorageRouter,
        format: SerializationFormat,
        max_text_length: usize,
    ) -> Self {
        let mut router = Self::new(storage, format);
        for descriptor in datatypes {
            if descriptor.source_table().is_some() {
                router.register(Arc::new(DatatypeObserver::new(descriptor.clone(), max_text_length)));
            }
        }
        router
    }

    pub fn register(&mut self, observer: Arc<dyn ChangeObserver>) {
        if let Some(table) = observer.descriptor().source_table() {
            self.observers
                .entry(table.to_string())
                .or_default()
                .push(observer);
        }
    }

    /// Handle one notification
    ///
    /// # Returns
    ///
    /// Returns the records appended and flushed to storage; empty when no
    /// datatype exports the table or the change.
    pub async fn on_change(
        &self,
        table: &str,
        operation: ChangeOperation,
        payload: &Value,
    ) -> Result<Vec<OutputRecord>> {
        let Some(observers) = self.observers.get(table) else {
            tracing::trace!(table, "No datatype observes table");
            return Ok(Vec::new());
        };

        let mut appended = Vec::new();
        for observer in observers {
            let Some(record) = observer.on_change(table, operation, payload)? else {
                continue;
            };
            let descriptor = observer.descriptor();
            let line = encode(&record, &descriptor.fields, self.format)?;
            let backend = self.storage.for_descriptor(descriptor);
            backend
                .append(BufferedRecord {
                    datatype: descriptor.name.clone(),
                    crud: record.crud,
                    data_id: record.id,
                    line,
                })
                .await?;
            backend.flush(&descriptor.name).await?;

            tracing::debug!(
                datatype = %descriptor.name,
                id = record.id,
                operation = %operation,
                "Change captured"
            );
            appended.push(record);
        }

        Ok(appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::core::storage::{DatabaseStorage, FileStorage, StorageBackend};
    use crate::core::transform::declared_fields;
    use crate::domain::{DatatypeName, StorageKind, TableType, TransformKind};
    use serde_json::json;
    use tempfile::TempDir;

    fn router(store: Arc<MemoryStore>, dir: &TempDir) -> ChangeRouter {
        let storage = StorageRouter::new(
            Arc::new(FileStorage::new(dir.path(), 100, SerializationFormat::Json)),
            Arc::new(DatabaseStorage::new(store, dir.path(), 100)),
        );
        let groups = DatatypeDescriptor::builder(DatatypeName::new("coursegroups").unwrap(), TransformKind::Group)
            .table("groups")
            .fields(declared_fields(TransformKind::Group))
            .build();
        let completions = DatatypeDescriptor::builder(DatatypeName::new("completions").unwrap(), TransformKind::LogEvent)
            .table_type(TableType::Logs)
            .table("logstore_standard_log")
            .condition("eventname", vec!["\\core\\event\\course_completed".to_string()])
            .fields(declared_fields(TransformKind::LogEvent))
            .build();
        let members = DatatypeDescriptor::builder(
            DatatypeName::new("coursegroupmembers").unwrap(),
            TransformKind::GroupMember,
        )
        .table("groups_members")
        .storage(StorageKind::File)
        .fields(declared_fields(TransformKind::GroupMember))
        .build();
        ChangeRouter::from_datatypes(
            &Datatypes::new(vec![groups, completions, members]),
            storage,
            SerializationFormat::Json,
            100,
        )
    }

    #[tokio::test]
    async fn test_create_is_transformed_and_staged() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let router = router(store.clone(), &dir);

        let payload = json!({
            "id": 4, "courseid": 2, "idnumber": "", "name": "Group A",
            "description": "", "timecreated": 10, "timemodified": 10
        });
        let records = router.on_change("groups", ChangeOperation::Create, &payload).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].crud, Crud::Created);
        assert_eq!(store.staged_count(&DatatypeName::new("coursegroups").unwrap()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_only_needs_id() {
        let dir = TempDir::new().unwrap();
        let router = router(Arc::new(MemoryStore::new()), &dir);
        let records = router
            .on_change("groups", ChangeOperation::Delete, &json!({"id": 9}))
            .await
            .unwrap();
        assert_eq!(records[0], OutputRecord::deleted(DatatypeName::new("coursegroups").unwrap(), 9));
    }

    #[tokio::test]
    async fn test_unobserved_table_and_filtered_events_are_ignored() {
        let dir = TempDir::new().unwrap();
        let router = router(Arc::new(MemoryStore::new()), &dir);

        let none = router
            .on_change("badge", ChangeOperation::Create, &json!({"id": 1}))
            .await
            .unwrap();
        assert!(none.is_empty());

        let other_event = router
            .on_change(
                "logstore_standard_log",
                ChangeOperation::Create,
                &json!({"id": 1, "eventname": "\\core\\event\\user_loggedin"}),
            )
            .await
            .unwrap();
        assert!(other_event.is_empty());
    }

    #[tokio::test]
    async fn test_file_capture_survives_the_router() {
        let dir = TempDir::new().unwrap();
        let router = router(Arc::new(MemoryStore::new()), &dir);
        router
            .on_change(
                "groups_members",
                ChangeOperation::Create,
                &json!({"id": 3, "groupid": 4, "userid": 5, "component": "", "timeadded": 10}),
            )
            .await
            .unwrap();
        drop(router);

        let reopened = FileStorage::new(dir.path(), 100, SerializationFormat::Json);
        let file = reopened
            .flush_to_file(&DatatypeName::new("coursegroupmembers").unwrap())
            .await
            .unwrap()
            .expect("captured change on disk");
        assert_eq!(file.record_count, 1);
    }

    #[tokio::test]
    async fn test_log_delete_respects_event_conditions() {
        let dir = TempDir::new().unwrap();
        let router = router(Arc::new(MemoryStore::new()), &dir);

        let other_event = router
            .on_change(
                "logstore_standard_log",
                ChangeOperation::Delete,
                &json!({"id": 1, "eventname": "\\core\\event\\user_loggedin"}),
            )
            .await
            .unwrap();
        assert!(other_event.is_empty());

        let matching = router
            .on_change(
                "logstore_standard_log",
                ChangeOperation::Delete,
                &json!({"id": 2, "eventname": "\\core\\event\\course_completed"}),
            )
            .await
            .unwrap();
        assert_eq!(matching.len(), 1);

        let id_only = router
            .on_change("logstore_standard_log", ChangeOperation::Delete, &json!({"id": 3}))
            .await
            .unwrap();
        assert_eq!(id_only[0].crud, Crud::Deleted);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let router = router(Arc::new(MemoryStore::new()), &dir);
        let err = router
            .on_change("groups", ChangeOperation::Update, &json!({"name": "no id"}))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Validation(_)));
    }

    #[test]
    fn test_operation_parsing() {
        assert_eq!("CREATE".parse::<ChangeOperation>().unwrap(), ChangeOperation::Create);
        assert_eq!(ChangeOperation::Delete.crud(), Crud::Deleted);
        assert!("merge".parse::<ChangeOperation>().is_err());
    }
}
