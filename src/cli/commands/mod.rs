//! CLI command implementations
//!
//! Commands that touch the LMS database share [`connect`] to load the
//! configuration and wire a [`Pipeline`].

pub mod artifacts;
pub mod export;
pub mod init;
pub mod migrate;
pub mod reset;
pub mod status;
pub mod validate;

use crate::adapters::database::create_stores;
use crate::cli::{EXIT_CONFIG, EXIT_CONNECTION};
use crate::config::{load_config, HarvestConfig};
use crate::core::Pipeline;
use std::sync::Arc;

/// Loads and validates the configuration, then connects and builds the pipeline
///
/// On failure the error is printed and the matching exit code returned.
pub(crate) async fn connect(config_path: &str) -> Result<(HarvestConfig, Arc<Pipeline>), i32> {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Failed to load configuration file");
            eprintln!("   Error: {e}");
            return Err(EXIT_CONFIG);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Configuration validation failed");
        eprintln!("Configuration validation failed: {e}");
        return Err(EXIT_CONFIG);
    }

    let stores = match create_stores(&config).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("❌ Failed to connect to database");
            eprintln!("   Error: {e}");
            return Err(EXIT_CONNECTION);
        }
    };

    match Pipeline::new(stores, &config) {
        Ok(pipeline) => Ok((config, Arc::new(pipeline))),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            Err(EXIT_CONFIG)
        }
    }
}
