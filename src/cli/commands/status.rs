//! Status command implementation
//!
//! Prints the export cursor of every datatype and the migration position.

use crate::cli::commands::connect;
use crate::cli::{EXIT_FATAL, EXIT_SUCCESS};
use crate::core::migration::MigrationState;
use crate::core::state::ExportCursor;
use chrono::{TimeZone, Utc};
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show only this datatype
    #[arg(short, long)]
    pub datatype: Option<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking export status");

        let (_, pipeline) = match connect(config_path).await {
            Ok(p) => p,
            Err(code) => return Ok(code),
        };

        let (state, cursors) = match tokio::try_join!(
            MigrationState::load(pipeline.stores.settings.as_ref()),
            pipeline.cursors.all_cursors()
        ) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("❌ Failed to load export state");
                eprintln!("   Error: {e}");
                return Ok(EXIT_FATAL);
            }
        };

        println!("📊 Export Status");
        println!();
        println!("Migration: {}", describe_migration(&state));
        println!();

        let cursors: Vec<_> = cursors
            .into_iter()
            .filter(|c| self.datatype.as_deref().map_or(true, |d| c.datatype.as_str() == d))
            .collect();

        if cursors.is_empty() {
            println!("No export history found.");
            println!("Run 'harvest export' to start exporting data.");
            return Ok(EXIT_SUCCESS);
        }

        println!(
            "{:<28} {:<10} {:>12} {:>12} {:>12} {:<20}",
            "Datatype", "Migrated", "Last id", "Rows", "Progress", "Last export"
        );
        println!("{}", "-".repeat(100));
        for cursor in &cursors {
            println!(
                "{:<28} {:<10} {:>12} {:>12} {:>11.1}% {:<20}",
                cursor.datatype.as_str(),
                if cursor.migrated { "yes" } else { "no" },
                cursor.last_exported_id,
                cursor.records_count,
                progress_pct(cursor),
                format_epoch(cursor.last_exported_time)
            );
        }
        println!();

        Ok(EXIT_SUCCESS)
    }
}

fn describe_migration(state: &MigrationState) -> String {
    match state {
        MigrationState::NotStarted => "not started".to_string(),
        MigrationState::InProgress { datatype, offset } => {
            format!("in progress ({datatype} at offset {offset})")
        }
        MigrationState::AllComplete => "complete".to_string(),
    }
}

fn progress_pct(cursor: &ExportCursor) -> f64 {
    if cursor.migrated || cursor.records_count == 0 {
        100.0
    } else {
        cursor.records_migrated as f64 / cursor.records_count as f64 * 100.0
    }
}

fn format_epoch(epoch: i64) -> String {
    if epoch == 0 {
        return "Never".to_string();
    }
    match Utc.timestamp_opt(epoch, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => epoch.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DatatypeName;

    #[test]
    fn test_format_epoch() {
        assert_eq!(format_epoch(0), "Never");
        assert_eq!(format_epoch(1_700_000_000), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_progress_pct() {
        let mut cursor = ExportCursor::new(DatatypeName::new("users").unwrap());
        assert_eq!(progress_pct(&cursor), 100.0);

        cursor.records_count = 200;
        cursor.records_migrated = 50;
        assert_eq!(progress_pct(&cursor), 25.0);

        cursor.migrated = true;
        assert_eq!(progress_pct(&cursor), 100.0);
    }

    #[test]
    fn test_describe_migration() {
        let state = MigrationState::InProgress {
            datatype: DatatypeName::new("courses").unwrap(),
            offset: 3000,
        };
        assert_eq!(describe_migration(&state), "in progress (courses at offset 3000)");
        assert_eq!(describe_migration(&MigrationState::AllComplete), "complete");
    }
}
