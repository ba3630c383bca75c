//! Reset command implementation
//!
//! Zeroes every export cursor and clears the migration position. Id
//! snapshots are kept, so deletions are still detected after a reset.

use crate::cli::commands::connect;
use crate::cli::{EXIT_FATAL, EXIT_SUCCESS};
use crate::core::migration::MigrationDriver;
use clap::Args;
use std::io::{self, Write};

/// Arguments for the reset command
#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl ResetArgs {
    /// Execute the reset command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        if !self.yes {
            println!("This forgets all export progress. The next export starts from scratch.");
            print!("Proceed with reset? [y/N]: ");
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Reset cancelled.");
                return Ok(EXIT_SUCCESS);
            }
        }

        let (config, pipeline) = match connect(config_path).await {
            Ok(p) => p,
            Err(code) => return Ok(code),
        };

        match MigrationDriver::new(pipeline, config.migration.batch_limit).reset().await {
            Ok(()) => {
                println!("✅ Export progress reset");
                Ok(EXIT_SUCCESS)
            }
            Err(e) => {
                tracing::error!(error = %e, "Reset failed");
                eprintln!("Reset failed: {e}");
                Ok(EXIT_FATAL)
            }
        }
    }
}
