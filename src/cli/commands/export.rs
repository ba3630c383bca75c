//! Export command implementation
//!
//! This module implements the `export` command, the scheduler's entry point
//! for incremental exports.

use crate::cli::commands::connect;
use crate::cli::{
    EXIT_FATAL, EXIT_INTERRUPTED, EXIT_PARTIAL, EXIT_REJECTED, EXIT_SUCCESS,
};
use crate::core::export::{ExportCoordinator, ExportSummary};
use crate::core::Pipeline;
use crate::domain::IncrementalStrategy;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Export only this datatype
    #[arg(short, long)]
    pub datatype: Option<String>,

    /// List what would be exported without reading or writing records
    #[arg(long)]
    pub dry_run: bool,
}

impl ExportArgs {
    /// Execute the export command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(datatype = ?self.datatype, "Starting export command");

        let (config, pipeline) = match connect(config_path).await {
            Ok(p) => p,
            Err(code) => return Ok(code),
        };

        if self.dry_run || config.application.dry_run {
            return dry_run(&pipeline, self.datatype.as_deref()).await;
        }

        let coordinator = ExportCoordinator::new(pipeline).with_shutdown(shutdown_signal);

        println!("🚀 Starting export...");
        println!();

        let result = match &self.datatype {
            Some(name) => coordinator.execute_datatype(name).await,
            None => coordinator.execute_export().await,
        };

        let summary = match result {
            Ok(s) => s,
            Err(e) if e.is_rejection() => {
                tracing::warn!(error = %e, "Export request rejected");
                eprintln!("Export rejected: {e}");
                return Ok(EXIT_REJECTED);
            }
            Err(e) => {
                tracing::error!(error = %e, "Export failed");
                eprintln!("Export failed: {e}");
                return Ok(EXIT_FATAL);
            }
        };

        print_summary(&summary);
        Ok(exit_code(&summary))
    }
}

async fn dry_run(pipeline: &Pipeline, only: Option<&str>) -> anyhow::Result<i32> {
    println!("🔍 DRY RUN MODE - nothing will be read into storage or written");
    println!();

    let descriptors = match only {
        Some(name) => vec![pipeline.registry.resolve(name).await?],
        None => pipeline.registry.get_datatypes(true).await?.into_iter().collect(),
    };

    println!(
        "{:<28} {:<24} {:<10} {:<12} {:<12}",
        "Datatype", "Incremental", "Storage", "Source rows", "Last id"
    );
    println!("{}", "-".repeat(90));

    for descriptor in &descriptors {
        let strategy = match descriptor.incremental_strategy() {
            IncrementalStrategy::Timestamp(field) => field,
            IncrementalStrategy::IdFilter => "id".to_string(),
            IncrementalStrategy::Full => "full".to_string(),
        };
        let rows = pipeline.exporter.count_source_rows(descriptor).await?;
        let cursor = pipeline.cursors.load(&descriptor.name).await?;

        println!(
            "{:<28} {:<24} {:<10} {:<12} {:<12}",
            descriptor.name.as_str(),
            strategy,
            descriptor.effective_storage().as_str(),
            rows,
            cursor.last_exported_id
        );
    }

    println!();
    Ok(EXIT_SUCCESS)
}

fn print_summary(summary: &ExportSummary) {
    println!();
    println!("📊 Export Summary:");
    println!("  Datatypes: {}", summary.total_datatypes);
    println!("  Exported: {}", summary.datatypes.len());
    println!("  Skipped: {}", summary.skipped.len());
    println!("  Failed: {}", summary.errors.len());
    println!("  Records: {}", summary.total_records());
    println!("  Artifacts: {}", summary.artifacts().count());
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    for outcome in &summary.datatypes {
        if outcome.records_exported == 0 && outcome.deleted == 0 {
            continue;
        }
        println!(
            "  {:<28} {:>8} records {:>6} deleted",
            outcome.datatype.as_str(),
            outcome.records_exported,
            outcome.deleted
        );
    }

    if !summary.errors.is_empty() {
        println!();
        println!("⚠️  Errors encountered:");
        for error in &summary.errors {
            match &error.datatype {
                Some(datatype) => {
                    println!("  - {datatype} {:?}: {}", error.error_type, error.message)
                }
                None => println!("  - {:?}: {}", error.error_type, error.message),
            }
        }
    }
    println!();
}

fn exit_code(summary: &ExportSummary) -> i32 {
    if summary.interrupted {
        println!("⚠️  Export interrupted. Progress saved; run the same command to resume.");
        tracing::info!("Export interrupted by user signal");
        EXIT_INTERRUPTED
    } else if summary.is_successful() {
        println!("✅ Export completed successfully!");
        EXIT_SUCCESS
    } else {
        println!("⚠️  Export completed with failures");
        EXIT_PARTIAL
    }
}
