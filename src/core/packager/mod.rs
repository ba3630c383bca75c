//! File packaging
//!
//! Turns a datatype's buffered content into one deliverable artifact under
//! `<artifacts_dir>/<datatype>/<uuid>.<ext>` and registers it for pickup.

pub mod pickup;

pub use pickup::{ArtifactPickup, PickupListing, PickupMetadata};

use crate::adapters::database::traits::{ArtifactIndex, SettingsStore};
use crate::core::storage::StorageRouter;
use crate::core::transform::csv_header;
use crate::domain::{DatatypeDescriptor, ExportArtifact, HarvestError, Result, SerializationFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Settings key holding the epoch of the last packaged artifact
pub const LAST_EXPORT_DATE: &str = "export.last_export_date";

pub struct FilePackager {
    artifacts: Arc<dyn ArtifactIndex>,
    settings: Arc<dyn SettingsStore>,
    storage: StorageRouter,
    artifacts_dir: PathBuf,
    format: SerializationFormat,
}

impl FilePackager {
    pub fn new(
        artifacts: Arc<dyn ArtifactIndex>,
        settings: Arc<dyn SettingsStore>,
        storage: StorageRouter,
        artifacts_dir: impl Into<PathBuf>,
        format: SerializationFormat,
    ) -> Self {
        Self {
            artifacts,
            settings,
            storage,
            artifacts_dir: artifacts_dir.into(),
            format,
        }
    }

    /// Package everything buffered for a datatype
    ///
    /// Rewritable datatypes drop their previous artifacts first. Storage is
    /// purged only once the new artifact is written and indexed.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` when nothing was buffered.
    pub async fn package(&self, descriptor: &DatatypeDescriptor) -> Result<Option<ExportArtifact>> {
        let backend = self.storage.for_descriptor(descriptor);
        let Some(drained) = backend.flush_to_file(&descriptor.name).await? else {
            tracing::debug!(datatype = %descriptor.name, "Nothing buffered, no artifact");
            return Ok(None);
        };

        if descriptor.rewritable_on_export {
            self.remove_previous(descriptor).await?;
        }

        let dir = self.artifacts_dir.join(descriptor.name.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let filename = format!("{}.{}", uuid::Uuid::new_v4(), self.format.extension());
        let path = dir.join(&filename);

        let mut output = tokio::fs::File::create(&path)
            .await
            .map_err(|e| HarvestError::Storage(format!("Cannot create {}: {e}", path.display())))?;
        if self.format == SerializationFormat::Csv {
            let mut header = csv_header(&descriptor.fields)?;
            header.push('\n');
            output.write_all(header.as_bytes()).await?;
        }
        let mut input = tokio::fs::File::open(&drained.path).await?;
        tokio::io::copy(&mut input, &mut output).await?;
        output.sync_all().await?;
        let size_bytes = output.metadata().await?.len();

        let mut artifact = ExportArtifact {
            id: 0,
            datatype: descriptor.name.clone(),
            filename,
            path,
            format: self.format,
            record_count: drained.record_count,
            size_bytes,
            created_at: chrono::Utc::now(),
        };
        artifact.id = self.artifacts.insert_artifact(&artifact).await?;

        backend.purge(&drained).await?;
        self.settings
            .set_setting(LAST_EXPORT_DATE, &artifact.created_at.timestamp().to_string())
            .await?;

        tracing::info!(
            datatype = %descriptor.name,
            artifact_id = artifact.id,
            filename = %artifact.filename,
            records = artifact.record_count,
            size_bytes = artifact.size_bytes,
            "Artifact packaged"
        );
        Ok(Some(artifact))
    }

    async fn remove_previous(&self, descriptor: &DatatypeDescriptor) -> Result<()> {
        let previous = self.artifacts.delete_artifacts(&descriptor.name).await?;
        for artifact in &previous {
            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if !previous.is_empty() {
            tracing::info!(
                datatype = %descriptor.name,
                removed = previous.len(),
                "Previous artifacts replaced"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::traits::ArtifactFilter;
    use crate::adapters::memory::MemoryStore;
    use crate::core::storage::{DatabaseStorage, FileStorage};
    use crate::core::transform::declared_fields;
    use crate::domain::{BufferedRecord, Crud, DatatypeName, StorageKind, TransformKind};
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<MemoryStore>,
        storage: StorageRouter,
        dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let buffer = dir.path().join("buffer");
        let storage = StorageRouter::new(
            Arc::new(FileStorage::new(&buffer, 100, SerializationFormat::Csv)),
            Arc::new(DatabaseStorage::new(store.clone(), &buffer, 100)),
        );
        Fixture { store, storage, dir }
    }

    fn packager(f: &Fixture, format: SerializationFormat) -> FilePackager {
        FilePackager::new(
            f.store.clone(),
            f.store.clone(),
            f.storage.clone(),
            f.dir.path().join("artifacts"),
            format,
        )
    }

    fn tracking(storage: StorageKind) -> DatatypeDescriptor {
        DatatypeDescriptor::builder(DatatypeName::new("trackinglog").unwrap(), TransformKind::TrackingLog)
            .query("SELECT 1")
            .rewritable(true)
            .storage(storage)
            .fields(declared_fields(TransformKind::TrackingLog))
            .build()
    }

    async fn buffer_line(f: &Fixture, descriptor: &DatatypeDescriptor, id: i64) {
        f.storage
            .for_descriptor(descriptor)
            .append(BufferedRecord {
                datatype: descriptor.name.clone(),
                crud: Crud::Created,
                data_id: id,
                line: format!("{id},2,3,4,5,c"),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_csv_artifact_has_header_and_is_indexed() {
        let f = fixture();
        let descriptor = tracking(StorageKind::Database);
        buffer_line(&f, &descriptor, 1).await;
        buffer_line(&f, &descriptor, 2).await;

        let artifact = packager(&f, SerializationFormat::Csv)
            .package(&descriptor)
            .await
            .unwrap()
            .unwrap();

        let content = tokio::fs::read_to_string(&artifact.path).await.unwrap();
        assert_eq!(content, "id,userid,courseid,visits,lastaccess,crud\n1,2,3,4,5,c\n2,2,3,4,5,c\n");
        assert_eq!(artifact.record_count, 2);
        assert!(artifact.filename.ends_with(".csv"));
        assert_eq!(f.store.staged_count(&descriptor.name).unwrap(), 0);
        assert!(f.store.get_setting(LAST_EXPORT_DATE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rewritable_replaces_previous_artifacts() {
        let f = fixture();
        let descriptor = tracking(StorageKind::File);
        let packager = packager(&f, SerializationFormat::Csv);

        buffer_line(&f, &descriptor, 1).await;
        let first = packager.package(&descriptor).await.unwrap().unwrap();
        buffer_line(&f, &descriptor, 2).await;
        let second = packager.package(&descriptor).await.unwrap().unwrap();

        assert!(!first.path.exists());
        let listed = f.store.list_artifacts(&ArtifactFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, second.id);
    }

    #[tokio::test]
    async fn test_nothing_buffered_yields_no_artifact() {
        let f = fixture();
        let result = packager(&f, SerializationFormat::Json)
            .package(&tracking(StorageKind::Database))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
