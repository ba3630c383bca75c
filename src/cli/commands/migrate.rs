//! Migrate command implementation
//!
//! Runs the historical backfill one window at a time, or until done.

use crate::cli::commands::connect;
use crate::cli::{EXIT_FATAL, EXIT_INTERRUPTED, EXIT_REJECTED, EXIT_SUCCESS};
use crate::core::migration::{MigrationDriver, MigrationStep};
use clap::Args;
use tokio::sync::watch;

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Keep stepping until every datatype is migrated
    #[arg(long)]
    pub all: bool,

    /// Override the migration window size
    #[arg(long, value_name = "ROWS")]
    pub batch_limit: Option<u64>,
}

impl MigrateArgs {
    /// Execute the migrate command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let (config, pipeline) = match connect(config_path).await {
            Ok(p) => p,
            Err(code) => return Ok(code),
        };

        let batch_limit = self.batch_limit.unwrap_or(config.migration.batch_limit);
        tracing::info!(batch_limit, all = self.all, "Starting migration command");
        let driver = MigrationDriver::new(pipeline, batch_limit);

        if !self.all {
            return match driver.step().await {
                Ok(step) => {
                    print_step(&step);
                    Ok(EXIT_SUCCESS)
                }
                Err(e) => Ok(failure_code(&e)),
            };
        }

        println!("🚚 Migrating historical data (window {batch_limit})...");
        let report = match driver.run_to_completion(Some(shutdown_signal)).await {
            Ok(r) => r,
            Err(e) => return Ok(failure_code(&e)),
        };

        println!();
        println!("📊 Migration Summary:");
        println!("  Windows: {}", report.windows);
        println!("  Records: {}", report.records);
        for datatype in &report.completed {
            println!("  ✅ {datatype}");
        }
        println!();

        if report.finished {
            println!("✅ Migration complete");
            Ok(EXIT_SUCCESS)
        } else {
            println!("⚠️  Migration paused. Run the same command to resume.");
            Ok(EXIT_INTERRUPTED)
        }
    }
}

fn print_step(step: &MigrationStep) {
    match step {
        MigrationStep::Window {
            datatype,
            offset,
            exported,
            records_count,
        } => println!("{datatype}: exported {exported} records from offset {offset} of {records_count}"),
        MigrationStep::DatatypeComplete { datatype, exported, artifact } => {
            println!("✅ {datatype}: migrated ({exported} records in last window)");
            if let Some(artifact) = artifact {
                println!("   Artifact: {}", artifact.path.display());
            }
        }
        MigrationStep::AllComplete => println!("✅ Migration complete"),
    }
}

fn failure_code(error: &crate::domain::HarvestError) -> i32 {
    if error.is_rejection() {
        tracing::warn!(error = %error, "Migration window rejected");
        eprintln!("Migration rejected: {error}");
        EXIT_REJECTED
    } else {
        tracing::error!(error = %error, "Migration failed");
        eprintln!("Migration failed: {error}");
        EXIT_FATAL
    }
}
