//! File-buffered storage
//!
//! Records accumulate in memory until `flush_threshold` is reached, then the
//! joined buffer is appended to `<buffer_dir>/<datatype>.buffer`. Draining
//! renames that file to a unique `.drain` file, which survives until purged.

use super::{count_records, drain_file_name, pending_drains, BufferedFile, StorageBackend};
use crate::domain::{BufferedRecord, DatatypeName, HarvestError, Result, SerializationFormat, StorageKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct FileStorage {
    buffer_dir: PathBuf,
    flush_threshold: usize,
    format: SerializationFormat,
    buffers: Mutex<HashMap<DatatypeName, Vec<String>>>,
}

impl FileStorage {
    pub fn new(buffer_dir: impl Into<PathBuf>, flush_threshold: usize, format: SerializationFormat) -> Self {
        Self {
            buffer_dir: buffer_dir.into(),
            flush_threshold: flush_threshold.max(1),
            format,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    fn buffer_path(&self, datatype: &DatatypeName) -> PathBuf {
        self.buffer_dir.join(format!("{datatype}.buffer"))
    }

    /// Records held in memory for a datatype
    pub async fn pending_in_memory(&self, datatype: &DatatypeName) -> usize {
        self.buffers.lock().await.get(datatype).map_or(0, Vec::len)
    }

    async fn spill(&self, datatype: &DatatypeName, lines: Vec<String>) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.buffer_dir).await?;
        let mut content = lines.join("\n");
        content.push('\n');

        let path = self.buffer_path(datatype);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| HarvestError::Storage(format!("Cannot open {}: {e}", path.display())))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| HarvestError::Storage(format!("Cannot write {}: {e}", path.display())))?;
        file.sync_all().await?;

        tracing::debug!(datatype = %datatype, records = lines.len(), "Buffer spilled to disk");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::File
    }

    async fn append(&self, record: BufferedRecord) -> Result<()> {
        let mut buffers = self.buffers.lock().await;
        let buffer = buffers.entry(record.datatype.clone()).or_default();
        buffer.push(record.line);

        if buffer.len() >= self.flush_threshold {
            let lines = std::mem::take(buffer);
            self.spill(&record.datatype, lines).await?;
        }
        Ok(())
    }

    async fn flush(&self, datatype: &DatatypeName) -> Result<()> {
        let mut buffers = self.buffers.lock().await;
        let lines = buffers.remove(datatype).unwrap_or_default();
        self.spill(datatype, lines).await
    }

    async fn flush_to_file(&self, datatype: &DatatypeName) -> Result<Option<BufferedFile>> {
        self.flush(datatype).await?;

        // A drain left by an interrupted packaging run goes first
        let path = match pending_drains(&self.buffer_dir, datatype).await?.into_iter().next() {
            Some(path) => path,
            None => {
                let buffer = self.buffer_path(datatype);
                if !tokio::fs::try_exists(&buffer).await? {
                    return Ok(None);
                }
                let drain = self.buffer_dir.join(drain_file_name(datatype));
                tokio::fs::rename(&buffer, &drain).await?;
                drain
            }
        };

        let record_count = count_records(&path, self.format).await?;
        if record_count == 0 {
            tokio::fs::remove_file(&path).await?;
            return Ok(None);
        }

        Ok(Some(BufferedFile {
            datatype: datatype.clone(),
            path,
            record_count,
            watermark: None,
        }))
    }

    async fn purge(&self, file: &BufferedFile) -> Result<()> {
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self, datatype: &DatatypeName) -> Result<()> {
        self.buffers.lock().await.remove(datatype);

        let mut paths = pending_drains(&self.buffer_dir, datatype).await?;
        paths.push(self.buffer_path(datatype));
        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Crud;
    use tempfile::TempDir;

    fn record(datatype: &DatatypeName, id: i64) -> BufferedRecord {
        BufferedRecord {
            datatype: datatype.clone(),
            crud: Crud::Created,
            data_id: id,
            line: format!("{{\"id\":{id},\"crud\":\"c\"}}"),
        }
    }

    #[tokio::test]
    async fn test_threshold_bounds_memory() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path(), 3, SerializationFormat::Json);
        let users = DatatypeName::new("users").unwrap();

        for id in 1..=7 {
            storage.append(record(&users, id)).await.unwrap();
        }
        assert_eq!(storage.pending_in_memory(&users).await, 1);

        let on_disk = tokio::fs::read_to_string(dir.path().join("users.buffer")).await.unwrap();
        assert_eq!(on_disk.lines().count(), 6);
    }

    #[tokio::test]
    async fn test_flush_to_file_drains_everything() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path(), 100, SerializationFormat::Json);
        let users = DatatypeName::new("users").unwrap();

        assert!(storage.flush_to_file(&users).await.unwrap().is_none());

        for id in 1..=5 {
            storage.append(record(&users, id)).await.unwrap();
        }
        let drained = storage.flush_to_file(&users).await.unwrap().unwrap();
        assert_eq!(drained.record_count, 5);
        assert!(!dir.path().join("users.buffer").exists());

        // Records appended after the drain go to a fresh buffer
        storage.append(record(&users, 6)).await.unwrap();

        // Unpurged drain is handed out again
        let again = storage.flush_to_file(&users).await.unwrap().unwrap();
        assert_eq!(again.path, drained.path);

        storage.purge(&drained).await.unwrap();
        let next = storage.flush_to_file(&users).await.unwrap().unwrap();
        assert_eq!(next.record_count, 1);
    }

    #[tokio::test]
    async fn test_delete_all() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path(), 1, SerializationFormat::Json);
        let users = DatatypeName::new("users").unwrap();
        storage.append(record(&users, 1)).await.unwrap();

        storage.delete_all(&users).await.unwrap();
        assert!(storage.flush_to_file(&users).await.unwrap().is_none());
    }
}
