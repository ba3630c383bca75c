//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Harvest configuration file.

use crate::cli::{EXIT_CONFIG, EXIT_SUCCESS};
use crate::config::{load_config, HarvestConfig};
use crate::core::registry::RegistryOptions;
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        let checked = config
            .validate()
            .and_then(|_| RegistryOptions::from_config(&config.export).map_err(|e| e.to_string()));

        match checked {
            Ok(_) => {
                println!("✅ Configuration is valid");
                println!();
                print_summary(&config);
                Ok(EXIT_SUCCESS)
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                Ok(EXIT_CONFIG)
            }
        }
    }
}

fn print_summary(config: &HarvestConfig) {
    println!("Configuration Summary:");
    println!("  Log Level: {}", config.application.log_level);
    println!("  Dry Run: {}", config.application.dry_run);
    println!("  Database: {}", redact_connection(config.database.connection_string.expose_secret().as_str()));
    println!("  Table Prefix: {}", config.database.table_prefix);
    println!("  Format: {}", config.export.format);
    println!("  Default Storage: {}", config.export.default_storage);
    println!("  Flush Threshold: {}", config.export.flush_threshold);
    println!("  Page Size: {}", config.export.page_size);
    println!("  Excluded Tables: {:?}", config.export.excluded_tables);
    println!("  Migration Window: {}", config.migration.batch_limit);
    println!("  Buffer Dir: {}", config.storage.buffer_dir.display());
    println!("  Artifacts Dir: {}", config.storage.artifacts_dir.display());
    println!();
}

/// Keeps only the part after the credentials
fn redact_connection(connection: &str) -> &str {
    connection.rsplit_once('@').map_or("***", |(_, host)| host)
}
