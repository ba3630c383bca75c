//! Core business logic for Harvest.
//!
//! # Modules
//!
//! - [`registry`] - Datatype catalogue: required, log and discovered datatypes
//! - [`state`] - Export cursors and id snapshots
//! - [`transform`] - Entity transforms and line serialization (JSON, CSV)
//! - [`storage`] - File- and database-buffered storage backends
//! - [`export`] - Batch export, coordination, task markers, change capture
//! - [`migration`] - Resumable historical backfill
//! - [`packager`] - Artifact packaging and pickup
//!
//! # Export Workflow
//!
//! 1. **Assemble**: build the datatype catalogue and apply persisted overrides
//! 2. **Read cursor**: where the last batch of each datatype stopped
//! 3. **Stream**: page through new or changed rows ordered by id
//! 4. **Transform**: map each row to an output record and serialize it
//! 5. **Buffer**: append to the datatype's storage backend
//! 6. **Reconcile**: diff id snapshots for datatypes without timestamps
//! 7. **Checkpoint**: advance the cursor and snapshot in one transaction
//! 8. **Package**: drain storage into an artifact for pickup
//!
//! # Example
//!
//! ```rust,no_run
//! use harvest::adapters::database::create_stores;
//! use harvest::config::load_config;
//! use harvest::core::export::ExportCoordinator;
//! use harvest::core::Pipeline;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("harvest.toml")?;
//! let stores = create_stores(&config).await?;
//! let pipeline = Arc::new(Pipeline::new(stores, &config)?);
//!
//! let summary = ExportCoordinator::new(pipeline).execute_export().await?;
//! println!("Records: {}", summary.total_records());
//! # Ok(())
//! # }
//! ```

pub mod export;
pub mod migration;
pub mod packager;
pub mod pipeline;
pub mod registry;
pub mod state;
pub mod storage;
pub mod transform;

pub use pipeline::Pipeline;
