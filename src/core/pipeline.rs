//! Pipeline wiring
//!
//! Builds every component of an export run from a [`Stores`] handle and the
//! configuration, so the coordinator, migration driver and change router
//! share one set of instances.

use crate::adapters::database::Stores;
use crate::config::HarvestConfig;
use crate::core::export::exporter::{ExporterSettings, RecordExporter};
use crate::core::export::guard::TaskGuard;
use crate::core::export::observer::ChangeRouter;
use crate::core::packager::{ArtifactPickup, FilePackager};
use crate::core::registry::{DatatypeRegistry, RegistryOptions};
use crate::core::state::{CursorStore, IdDiffReconciler};
use crate::core::storage::{DatabaseStorage, FileStorage, StorageRouter};
use crate::domain::{HarvestError, Result, SerializationFormat};
use std::sync::Arc;

pub struct Pipeline {
    pub stores: Stores,
    pub registry: DatatypeRegistry,
    pub cursors: Arc<CursorStore>,
    pub storage: StorageRouter,
    pub exporter: RecordExporter,
    pub packager: FilePackager,
    pub guard: TaskGuard,
    pub format: SerializationFormat,
    pub max_text_length: usize,
}

impl Pipeline {
    /// # Errors
    ///
    /// Returns a configuration error for an invalid format, storage kind or
    /// table pattern.
    pub fn new(stores: Stores, config: &HarvestConfig) -> Result<Self> {
        let export = &config.export;
        let format = export
            .serialization_format()
            .map_err(HarvestError::Configuration)?;

        let registry = DatatypeRegistry::new(
            stores.source.clone(),
            stores.datatype_config.clone(),
            RegistryOptions::from_config(export)?,
        );
        let cursors = Arc::new(CursorStore::new(stores.state.clone()));

        let storage = StorageRouter::new(
            Arc::new(FileStorage::new(
                &config.storage.buffer_dir,
                export.flush_threshold,
                format,
            )),
            Arc::new(DatabaseStorage::new(
                stores.staging.clone(),
                &config.storage.buffer_dir,
                export.page_size,
            )),
        );

        let exporter = RecordExporter::new(
            stores.source.clone(),
            cursors.clone(),
            IdDiffReconciler::new(stores.source.clone(), stores.state.clone()),
            storage.clone(),
            ExporterSettings {
                format,
                page_size: export.page_size,
                max_text_length: export.max_text_length,
            },
        );

        let packager = FilePackager::new(
            stores.artifacts.clone(),
            stores.settings.clone(),
            storage.clone(),
            &config.storage.artifacts_dir,
            format,
        );
        let guard = TaskGuard::new(stores.settings.clone(), export.task_timeout_seconds);

        Ok(Self {
            stores,
            registry,
            cursors,
            storage,
            exporter,
            packager,
            guard,
            format,
            max_text_length: export.max_text_length,
        })
    }

    pub fn pickup(&self) -> ArtifactPickup {
        ArtifactPickup::new(self.stores.artifacts.clone(), self.stores.settings.clone())
    }

    /// Change router over the enabled datatypes
    pub async fn change_router(&self) -> Result<ChangeRouter> {
        let datatypes = self.registry.get_datatypes(true).await?;
        Ok(ChangeRouter::from_datatypes(
            &datatypes,
            self.storage.clone(),
            self.format,
            self.max_text_length,
        ))
    }
}
