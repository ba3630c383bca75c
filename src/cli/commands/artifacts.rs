//! Artifacts command implementation
//!
//! Lists packaged artifacts for the downstream collector.

use crate::adapters::database::ArtifactFilter;
use crate::cli::commands::connect;
use crate::cli::{EXIT_FATAL, EXIT_SUCCESS};
use crate::domain::DatatypeName;
use chrono::{DateTime, Utc};
use clap::Args;

/// Arguments for the artifacts command
#[derive(Args, Debug)]
pub struct ArtifactsArgs {
    /// Only artifacts of this datatype
    #[arg(short, long)]
    pub datatype: Option<String>,

    /// Only artifacts created after this RFC 3339 instant
    #[arg(long, value_name = "TIME")]
    pub since_time: Option<String>,

    /// Only artifacts with a greater id
    #[arg(long, value_name = "ID")]
    pub since_id: Option<i64>,

    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

impl ArtifactsArgs {
    /// Builds the pickup filter from the arguments
    pub fn filter(&self) -> anyhow::Result<ArtifactFilter> {
        let datatype = self
            .datatype
            .as_deref()
            .map(DatatypeName::new)
            .transpose()
            .map_err(|e| anyhow::anyhow!(e))?;
        let since_time = self
            .since_time
            .as_deref()
            .map(|s| DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc)))
            .transpose()?;

        Ok(ArtifactFilter {
            datatype,
            since_time,
            since_id: self.since_id,
        })
    }

    /// Execute the artifacts command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let filter = self.filter()?;
        let (_, pipeline) = match connect(config_path).await {
            Ok(p) => p,
            Err(code) => return Ok(code),
        };

        let listing = match pipeline.pickup().list(&filter).await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Failed to list artifacts: {e}");
                return Ok(EXIT_FATAL);
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&listing)?);
            return Ok(EXIT_SUCCESS);
        }

        println!("📦 Artifacts: {}", listing.artifacts.len());
        println!();
        for artifact in &listing.artifacts {
            println!(
                "{:>8} {:<24} {:>8} {}",
                artifact.id,
                artifact.datatype.as_str(),
                artifact.record_count,
                artifact.path.display()
            );
        }
        println!();
        println!("Plugin version: {}", listing.metadata.plugin_version);
        if let Some(date) = listing.metadata.last_export_date {
            println!("Last export: {date}");
        }
        if let Some(date) = listing.metadata.last_migration_date {
            println!("Last migration: {date}");
        }
        Ok(EXIT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ArtifactsArgs {
        ArtifactsArgs {
            datatype: None,
            since_time: None,
            since_id: None,
            json: false,
        }
    }

    #[test]
    fn test_filter_defaults() {
        let filter = args().filter().unwrap();
        assert!(filter.datatype.is_none());
        assert!(filter.since_time.is_none());
        assert!(filter.since_id.is_none());
    }

    #[test]
    fn test_filter_parses_values() {
        let filter = ArtifactsArgs {
            datatype: Some("grades".into()),
            since_time: Some("2024-05-01T12:00:00Z".into()),
            since_id: Some(3),
            ..args()
        }
        .filter()
        .unwrap();

        assert_eq!(filter.datatype.unwrap().as_str(), "grades");
        assert_eq!(filter.since_time.unwrap().timestamp(), 1_714_564_800);
        assert_eq!(filter.since_id, Some(3));
    }

    #[test]
    fn test_filter_rejects_bad_time() {
        let bad = ArtifactsArgs {
            since_time: Some("yesterday".into()),
            ..args()
        };
        assert!(bad.filter().is_err());
    }
}
