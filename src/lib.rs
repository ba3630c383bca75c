// Harvest - LMS Analytics Export Pipeline
// Copyright (c) 2025 Harvest Contributors
// Licensed under the MIT License

//! # Harvest - LMS analytics export
//!
//! Harvest copies learning-management-system data (users, courses,
//! enrolments, grades, activity logs and any other table it discovers) out
//! of the LMS database into append-only artifact files for an external
//! analytics platform.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Cataloguing** exportable datatypes: a fixed required set, log stores,
//!   and optional tables discovered by schema introspection
//! - **Exporting** incrementally by timestamp or id, with deletion detection
//!   for tables that carry no timestamp
//! - **Migrating** historical data in resumable windows
//! - **Packaging** buffered records into JSON-lines or CSV artifacts
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (registry, export, migration, storage, packaging)
//! - [`adapters`] - Store integrations (PostgreSQL, in-memory)
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harvest::adapters::database::create_stores;
//! use harvest::config::load_config;
//! use harvest::core::export::ExportCoordinator;
//! use harvest::core::Pipeline;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("harvest.toml")?;
//!     let stores = create_stores(&config).await?;
//!     let pipeline = Arc::new(Pipeline::new(stores, &config)?);
//!
//!     let summary = ExportCoordinator::new(pipeline).execute_export().await?;
//!     println!("Exported {} records", summary.total_records());
//!     Ok(())
//! }
//! ```
//!
//! ## Historical migration
//!
//! ```rust,no_run
//! use harvest::core::migration::MigrationDriver;
//! # use harvest::core::Pipeline;
//! # use std::sync::Arc;
//!
//! # async fn example(pipeline: Arc<Pipeline>) -> Result<(), Box<dyn std::error::Error>> {
//! let driver = MigrationDriver::new(pipeline, 1000);
//! let report = driver.run_to_completion(None).await?;
//! assert!(report.finished);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::Result`], whose error type is
//! [`domain::HarvestError`].

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
