//! Store factory
//!
//! This module provides the [`Stores`] handle and the factory that builds it
//! from configuration.

use crate::adapters::database::traits::{
    ArtifactIndex, DatatypeConfigStorage, SettingsStore, SourceStore, StagingStorage,
    StateStorage,
};
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::schema::HarvestConfig;
use crate::domain::Result;
use std::sync::Arc;

/// One handle per persistence seam
///
/// Adapters implement every trait on a single type; this struct exposes that
/// type through each trait object so components only see what they use.
#[derive(Clone)]
pub struct Stores {
    pub source: Arc<dyn SourceStore>,
    pub state: Arc<dyn StateStorage>,
    pub settings: Arc<dyn SettingsStore>,
    pub datatype_config: Arc<dyn DatatypeConfigStorage>,
    pub staging: Arc<dyn StagingStorage>,
    pub artifacts: Arc<dyn ArtifactIndex>,
}

impl Stores {
    /// Builds the handle from an adapter that implements every seam
    pub fn from_adapter<A>(adapter: Arc<A>) -> Self
    where
        A: SourceStore
            + StateStorage
            + SettingsStore
            + DatatypeConfigStorage
            + StagingStorage
            + ArtifactIndex
            + 'static,
    {
        Self {
            source: adapter.clone(),
            state: adapter.clone(),
            settings: adapter.clone(),
            datatype_config: adapter.clone(),
            staging: adapter.clone(),
            artifacts: adapter,
        }
    }
}

/// Create every store from the configuration
///
/// Connects to PostgreSQL, applies the bookkeeping schema and wraps one
/// shared connection pool in a [`Stores`] handle.
///
/// # Errors
///
/// Returns an error if the pool cannot be created or the schema fails to apply.
pub async fn create_stores(config: &HarvestConfig) -> Result<Stores> {
    tracing::info!(
        table_prefix = %config.database.table_prefix,
        max_connections = config.database.max_connections,
        "Creating PostgreSQL stores"
    );

    let client = Arc::new(PostgreSQLClient::new(config.database.clone()).await?);
    client.ensure_schema().await?;
    let adapter = Arc::new(PostgreSQLAdapter::new_with_arc(client));

    Ok(Stores::from_adapter(adapter))
}
