//! Export coordinator - entry point of scheduled export runs
//!
//! A run either covers the whole catalogue or one requested datatype. Each
//! datatype is exported under its task marker and then packaged. Failures
//! are recorded per datatype; the rest of the catalogue still runs.

use crate::core::export::exporter::ExportParams;
use crate::core::export::summary::{DatatypeOutcome, ExportError, ExportSummary};
use crate::core::migration::MigrationState;
use crate::core::Pipeline;
use crate::domain::{DatatypeDescriptor, HarvestError, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Export coordinator
pub struct ExportCoordinator {
    pipeline: Arc<Pipeline>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl ExportCoordinator {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            shutdown_rx: None,
        }
    }

    /// Stop between datatypes once the receiver reads `true`
    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Export every enabled datatype
    ///
    /// While a historical migration is running, datatypes it has not reached
    /// yet are skipped.
    pub async fn execute_export(&self) -> Result<ExportSummary> {
        let start_time = Instant::now();
        let mut summary = ExportSummary::new();

        tracing::info!("Starting export process");

        let datatypes = self.pipeline.registry.get_datatypes(true).await?;
        let migrating = MigrationState::load(self.pipeline.stores.settings.as_ref())
            .await?
            .is_in_progress();
        summary.total_datatypes = datatypes.len();

        for descriptor in &datatypes {
            if self.shutdown_requested() {
                tracing::warn!("Shutdown requested, stopping export");
                summary.interrupted = true;
                break;
            }

            if migrating && !self.pipeline.cursors.load(&descriptor.name).await?.migrated {
                tracing::debug!(datatype = %descriptor.name, "Awaiting migration, skipped");
                summary.skip(descriptor.name.clone(), "awaiting migration");
                continue;
            }

            match self.export_datatype(descriptor).await {
                Ok(outcome) => summary.add_outcome(outcome),
                Err(HarvestError::TaskInFlight(_)) => {
                    tracing::info!(datatype = %descriptor.name, "Export already running, skipped");
                    summary.skip(descriptor.name.clone(), "already running");
                }
                Err(e) => {
                    tracing::error!(
                        datatype = %descriptor.name,
                        error = %e,
                        "Failed to export datatype"
                    );
                    summary.add_error(ExportError::from_error(&descriptor.name, &e));
                }
            }
        }

        summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    /// Export one datatype on request
    ///
    /// # Errors
    ///
    /// Unknown or disabled datatypes, and datatypes with an export already
    /// in flight, are rejected before anything is read or written.
    pub async fn execute_datatype(&self, datatype: &str) -> Result<ExportSummary> {
        let start_time = Instant::now();
        let descriptor = self.pipeline.registry.resolve(datatype).await?;

        let mut summary = ExportSummary::new();
        summary.total_datatypes = 1;
        match self.export_datatype(&descriptor).await {
            Ok(outcome) => summary.add_outcome(outcome),
            Err(e) if e.is_rejection() => return Err(e),
            Err(e) => {
                tracing::error!(datatype = %descriptor.name, error = %e, "Failed to export datatype");
                summary.add_error(ExportError::from_error(&descriptor.name, &e));
            }
        }

        summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    async fn export_datatype(&self, descriptor: &DatatypeDescriptor) -> Result<DatatypeOutcome> {
        let pipeline = &self.pipeline;
        pipeline
            .guard
            .run(&descriptor.name, || async {
                let batch = pipeline
                    .exporter
                    .export_batch(descriptor, ExportParams::incremental())
                    .await?;
                let artifact = pipeline.packager.package(descriptor).await?;
                Ok::<_, HarvestError>(DatatypeOutcome {
                    datatype: descriptor.name.clone(),
                    records_exported: batch.records_exported,
                    deleted: batch.deleted,
                    artifact,
                })
            })
            .await
    }
}
