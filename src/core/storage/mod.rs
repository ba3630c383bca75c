//! Storage backends
//!
//! Serialized records wait in a [`StorageBackend`] between export and
//! packaging. Two interchangeable implementations exist:
//!
//! - [`FileStorage`]: bounded in-memory buffer spilled to a local file
//! - [`DatabaseStorage`]: one staging row per record, drained at packaging
//!
//! Draining produces a [`BufferedFile`]; the packager turns it into an
//! artifact and then calls [`StorageBackend::purge`]. Until then the drained
//! content stays recoverable, so a crash between the two only repeats work.

pub mod database;
pub mod file;

pub use database::DatabaseStorage;
pub use file::FileStorage;

use crate::domain::{BufferedRecord, DatatypeDescriptor, DatatypeName, Result, SerializationFormat, StorageKind};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Drained content of one datatype
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedFile {
    pub datatype: DatatypeName,
    /// File holding one serialized record per line
    pub path: PathBuf,
    pub record_count: u64,
    /// Highest staging id included (database backend only)
    pub watermark: Option<i64>,
}

/// Common contract of the buffering strategies
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Buffer one serialized record
    async fn append(&self, record: BufferedRecord) -> Result<()>;

    /// Make every appended record durable
    async fn flush(&self, datatype: &DatatypeName) -> Result<()>;

    /// Drain buffered content into a file
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` when nothing is buffered.
    async fn flush_to_file(&self, datatype: &DatatypeName) -> Result<Option<BufferedFile>>;

    /// Forget the content of a drained file
    async fn purge(&self, file: &BufferedFile) -> Result<()>;

    /// Drop everything buffered for a datatype
    async fn delete_all(&self, datatype: &DatatypeName) -> Result<()>;
}

/// Picks the backend for each datatype
#[derive(Clone)]
pub struct StorageRouter {
    file: Arc<dyn StorageBackend>,
    database: Arc<dyn StorageBackend>,
}

impl StorageRouter {
    pub fn new(file: Arc<dyn StorageBackend>, database: Arc<dyn StorageBackend>) -> Self {
        Self { file, database }
    }

    pub fn backend(&self, kind: StorageKind) -> Arc<dyn StorageBackend> {
        match kind {
            StorageKind::File => self.file.clone(),
            StorageKind::Database => self.database.clone(),
        }
    }

    pub fn for_descriptor(&self, descriptor: &DatatypeDescriptor) -> Arc<dyn StorageBackend> {
        self.backend(descriptor.effective_storage())
    }

    /// Clears a datatype from both backends
    pub async fn delete_all(&self, datatype: &DatatypeName) -> Result<()> {
        self.file.delete_all(datatype).await?;
        self.database.delete_all(datatype).await
    }
}

pub(crate) fn drain_file_name(datatype: &DatatypeName) -> String {
    format!("{datatype}.{}.drain", uuid::Uuid::new_v4())
}

/// Drain files left behind for a datatype, oldest name first
pub(crate) async fn pending_drains(dir: &Path, datatype: &DatatypeName) -> Result<Vec<PathBuf>> {
    let prefix = format!("{datatype}.");
    let mut found = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && name.ends_with(".drain") {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Counts records in a buffered file
///
/// JSON lines never contain raw newlines; CSV fields may, so CSV content is
/// parsed rather than split.
pub(crate) async fn count_records(path: &Path, format: SerializationFormat) -> Result<u64> {
    let content = tokio::fs::read(path).await?;
    match format {
        SerializationFormat::Json => Ok(content
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .count() as u64),
        SerializationFormat::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(content.as_slice());
            let mut count = 0u64;
            for record in reader.byte_records() {
                record?;
                count += 1;
            }
            Ok(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_count_records_handles_embedded_newlines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.drain");
        tokio::fs::write(&path, "1,\"a\nb\",c\n2,x,u\n").await.unwrap();
        assert_eq!(count_records(&path, SerializationFormat::Csv).await.unwrap(), 2);

        tokio::fs::write(&path, "{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n").await.unwrap();
        assert_eq!(count_records(&path, SerializationFormat::Json).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_pending_drains_match_datatype_prefix() {
        let dir = TempDir::new().unwrap();
        let users = DatatypeName::new("users").unwrap();
        for name in ["users.a.drain", "users_extra.b.drain", "users.buffer"] {
            tokio::fs::write(dir.path().join(name), "").await.unwrap();
        }
        let drains = pending_drains(dir.path(), &users).await.unwrap();
        assert_eq!(drains, vec![dir.path().join("users.a.drain")]);

        let missing = pending_drains(&dir.path().join("nope"), &users).await.unwrap();
        assert!(missing.is_empty());
    }
}
