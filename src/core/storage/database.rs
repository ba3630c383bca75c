//! Database-buffered storage
//!
//! Every record becomes a staging row at once. Draining copies the rows up to
//! the current maximum staging id into a file, page by page; purging deletes
//! staged rows up to that watermark, leaving later appends in place.

use super::{drain_file_name, pending_drains, BufferedFile, StorageBackend};
use crate::adapters::database::traits::StagingStorage;
use crate::domain::{BufferedRecord, DatatypeName, Result, StorageKind};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

pub struct DatabaseStorage {
    staging: Arc<dyn StagingStorage>,
    buffer_dir: PathBuf,
    page_size: u64,
}

impl DatabaseStorage {
    pub fn new(staging: Arc<dyn StagingStorage>, buffer_dir: impl Into<PathBuf>, page_size: u64) -> Self {
        Self {
            staging,
            buffer_dir: buffer_dir.into(),
            page_size: page_size.max(1),
        }
    }

    async fn remove_stale_drains(&self, datatype: &DatatypeName) -> Result<()> {
        for path in pending_drains(&self.buffer_dir, datatype).await? {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for DatabaseStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Database
    }

    async fn append(&self, record: BufferedRecord) -> Result<()> {
        self.staging.insert_staged(&record).await?;
        Ok(())
    }

    async fn flush(&self, _datatype: &DatatypeName) -> Result<()> {
        Ok(())
    }

    async fn flush_to_file(&self, datatype: &DatatypeName) -> Result<Option<BufferedFile>> {
        // Staged rows are still there, so an old drain is simply rebuilt
        self.remove_stale_drains(datatype).await?;

        let Some(watermark) = self.staging.max_staged_id(datatype).await? else {
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.buffer_dir).await?;
        let path = self.buffer_dir.join(drain_file_name(datatype));
        let mut file = tokio::fs::File::create(&path).await?;

        let mut after_id = 0;
        let mut record_count = 0u64;
        loop {
            let page = self
                .staging
                .fetch_staged(datatype, after_id, watermark, self.page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = last.id;
            record_count += page.len() as u64;

            let mut chunk = String::new();
            for staged in &page {
                chunk.push_str(&staged.line);
                chunk.push('\n');
            }
            file.write_all(chunk.as_bytes()).await?;

            if (page.len() as u64) < self.page_size {
                break;
            }
        }
        file.sync_all().await?;

        tracing::debug!(
            datatype = %datatype,
            records = record_count,
            watermark,
            "Staging rows drained"
        );

        Ok(Some(BufferedFile {
            datatype: datatype.clone(),
            path,
            record_count,
            watermark: Some(watermark),
        }))
    }

    async fn purge(&self, file: &BufferedFile) -> Result<()> {
        if let Some(watermark) = file.watermark {
            let removed = self.staging.purge_staged(&file.datatype, watermark).await?;
            tracing::debug!(datatype = %file.datatype, removed, "Staging rows purged");
        }
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self, datatype: &DatatypeName) -> Result<()> {
        self.staging.delete_staged(datatype).await?;
        self.remove_stale_drains(datatype).await
    }
}
