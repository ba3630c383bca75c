//! Migration driver
//!
//! Walks the registry in order, exporting one fixed-size window per call and
//! persisting where the next call resumes.

use super::state::MigrationState;
use super::LAST_MIGRATION_DATE;
use crate::core::export::exporter::ExportParams;
use crate::core::registry::Datatypes;
use crate::core::Pipeline;
use crate::domain::{DatatypeDescriptor, DatatypeName, ExportArtifact, Result};
use std::sync::Arc;
use tokio::sync::watch;

/// What one driver call did
#[derive(Debug, Clone)]
pub enum MigrationStep {
    /// A window was exported and more rows remain
    Window {
        datatype: DatatypeName,
        offset: u64,
        exported: u64,
        records_count: u64,
    },
    /// The last window of a datatype was exported and packaged
    DatatypeComplete {
        datatype: DatatypeName,
        exported: u64,
        artifact: Option<ExportArtifact>,
    },
    /// Nothing left to migrate
    AllComplete,
}

/// Totals of a multi-step run
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub windows: u64,
    pub records: u64,
    pub completed: Vec<DatatypeName>,
    pub finished: bool,
}

pub struct MigrationDriver {
    pipeline: Arc<Pipeline>,
    batch_limit: u64,
}

impl MigrationDriver {
    pub fn new(pipeline: Arc<Pipeline>, batch_limit: u64) -> Self {
        Self {
            pipeline,
            batch_limit: batch_limit.max(1),
        }
    }

    pub async fn state(&self) -> Result<MigrationState> {
        MigrationState::load(self.pipeline.stores.settings.as_ref()).await
    }

    /// Run one window
    ///
    /// Datatypes that are already migrated or have no rows are passed over
    /// within the same call.
    ///
    /// # Errors
    ///
    /// On failure the stored position is unchanged, so the next call
    /// repeats the same window.
    pub async fn step(&self) -> Result<MigrationStep> {
        let datatypes = self.pipeline.registry.get_datatypes(true).await?;
        let mut state = self.state().await?;

        loop {
            let (descriptor, offset) = match &state {
                MigrationState::AllComplete => return Ok(MigrationStep::AllComplete),
                MigrationState::NotStarted => match datatypes.first() {
                    Some(first) => (first.clone(), 0),
                    None => {
                        self.finish().await?;
                        return Ok(MigrationStep::AllComplete);
                    }
                },
                MigrationState::InProgress { datatype, offset } => match datatypes.get(datatype) {
                    Some(descriptor) => (descriptor.clone(), *offset),
                    None => {
                        tracing::warn!(
                            datatype = %datatype,
                            "Migrating datatype no longer enabled, restarting from the first pending one"
                        );
                        match datatypes.first() {
                            Some(first) => (first.clone(), 0),
                            None => {
                                self.finish().await?;
                                return Ok(MigrationStep::AllComplete);
                            }
                        }
                    }
                },
            };

            let name = descriptor.name.clone();
            if self.pipeline.cursors.load(&name).await?.migrated {
                state = self.advance(&datatypes, &name).await?;
                continue;
            }

            let records_count = self.pipeline.exporter.count_source_rows(&descriptor).await?;
            self.pipeline.cursors.set_records_count(&name, records_count).await?;

            if records_count == 0 {
                tracing::info!(datatype = %name, "No rows to migrate");
                self.pipeline.cursors.mark_migrated(&name).await?;
                state = self.advance(&datatypes, &name).await?;
                continue;
            }

            return self.export_window(&datatypes, &descriptor, offset, records_count).await;
        }
    }

    async fn export_window(
        &self,
        datatypes: &Datatypes,
        descriptor: &DatatypeDescriptor,
        offset: u64,
        records_count: u64,
    ) -> Result<MigrationStep> {
        let name = &descriptor.name;
        let params = ExportParams::window(offset, self.batch_limit);
        let outcome = self
            .pipeline
            .guard
            .run(name, || self.pipeline.exporter.export_batch(descriptor, params))
            .await?;

        let next_offset = offset + self.batch_limit;
        if next_offset >= records_count {
            self.pipeline.cursors.mark_migrated(name).await?;
            let artifact = self.pipeline.packager.package(descriptor).await?;
            self.advance(datatypes, name).await?;

            tracing::info!(datatype = %name, records_count, "Datatype migrated");
            return Ok(MigrationStep::DatatypeComplete {
                datatype: name.clone(),
                exported: outcome.records_exported,
                artifact,
            });
        }

        MigrationState::InProgress {
            datatype: name.clone(),
            offset: next_offset,
        }
        .save(self.pipeline.stores.settings.as_ref())
        .await?;

        crate::log_migration_progress!(name, next_offset, records_count);
        Ok(MigrationStep::Window {
            datatype: name.clone(),
            offset,
            exported: outcome.records_exported,
            records_count,
        })
    }

    async fn advance(&self, datatypes: &Datatypes, current: &DatatypeName) -> Result<MigrationState> {
        let state = match datatypes.next_after(current) {
            Some(next) => MigrationState::InProgress {
                datatype: next.name.clone(),
                offset: 0,
            },
            None => {
                self.finish().await?;
                return Ok(MigrationState::AllComplete);
            }
        };
        state.save(self.pipeline.stores.settings.as_ref()).await?;
        Ok(state)
    }

    async fn finish(&self) -> Result<()> {
        let settings = self.pipeline.stores.settings.as_ref();
        MigrationState::AllComplete.save(settings).await?;
        settings
            .set_setting(LAST_MIGRATION_DATE, &chrono::Utc::now().timestamp().to_string())
            .await?;
        tracing::info!("Migration complete");
        Ok(())
    }

    /// Step until everything is migrated or `shutdown` flips to `true`
    pub async fn run_to_completion(&self, shutdown: Option<watch::Receiver<bool>>) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        loop {
            if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                tracing::warn!("Shutdown requested, migration paused");
                return Ok(report);
            }

            match self.step().await? {
                MigrationStep::Window { exported, .. } => {
                    report.windows += 1;
                    report.records += exported;
                }
                MigrationStep::DatatypeComplete { datatype, exported, .. } => {
                    report.windows += 1;
                    report.records += exported;
                    report.completed.push(datatype);
                }
                MigrationStep::AllComplete => {
                    report.finished = true;
                    return Ok(report);
                }
            }
        }
    }

    /// Zero every cursor and forget the migration position
    pub async fn reset(&self) -> Result<()> {
        self.pipeline.cursors.reset_all().await?;
        MigrationState::NotStarted
            .save(self.pipeline.stores.settings.as_ref())
            .await?;
        tracing::info!("Migration state reset");
        Ok(())
    }
}
