//! Artifact pickup
//!
//! Lists artifacts not yet collected by the analytics service, together with
//! the run metadata it uses to decide what to fetch.

use crate::adapters::database::traits::{ArtifactFilter, ArtifactIndex, SettingsStore};
use crate::core::migration::LAST_MIGRATION_DATE;
use crate::core::packager::LAST_EXPORT_DATE;
use crate::domain::{ExportArtifact, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickupMetadata {
    pub last_migration_date: Option<i64>,
    pub last_export_date: Option<i64>,
    pub plugin_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PickupListing {
    pub artifacts: Vec<ExportArtifact>,
    pub metadata: PickupMetadata,
}

pub struct ArtifactPickup {
    artifacts: Arc<dyn ArtifactIndex>,
    settings: Arc<dyn SettingsStore>,
}

impl ArtifactPickup {
    pub fn new(artifacts: Arc<dyn ArtifactIndex>, settings: Arc<dyn SettingsStore>) -> Self {
        Self { artifacts, settings }
    }

    pub async fn list(&self, filter: &ArtifactFilter) -> Result<PickupListing> {
        let artifacts = self.artifacts.list_artifacts(filter).await?;
        Ok(PickupListing {
            artifacts,
            metadata: self.metadata().await?,
        })
    }

    pub async fn metadata(&self) -> Result<PickupMetadata> {
        Ok(PickupMetadata {
            last_migration_date: self.epoch_setting(LAST_MIGRATION_DATE).await?,
            last_export_date: self.epoch_setting(LAST_EXPORT_DATE).await?,
            plugin_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    async fn epoch_setting(&self, key: &str) -> Result<Option<i64>> {
        Ok(self
            .settings
            .get_setting(key)
            .await?
            .and_then(|v| v.parse().ok()))
    }
}
