//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Harvest using clap.
//! Every command returns a process exit code:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | finished with per-datatype failures |
//! | 2 | configuration error |
//! | 3 | request rejected (unknown/disabled datatype, export in flight) |
//! | 4 | database connection error |
//! | 5 | fatal error |
//! | 130 | interrupted, progress saved |

pub mod commands;

use clap::{Parser, Subcommand};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_REJECTED: i32 = 3;
pub const EXIT_CONNECTION: i32 = 4;
pub const EXIT_FATAL: i32 = 5;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Harvest - LMS analytics export
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version, about, long_about = None)]
#[command(author = "Harvest Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "harvest.toml", env = "HARVEST_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "HARVEST_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export new and changed records for every datatype, or one
    Export(commands::export::ExportArgs),

    /// Run the historical migration
    Migrate(commands::migrate::MigrateArgs),

    /// Show export cursors and migration progress
    Status(commands::status::StatusArgs),

    /// Forget all export progress
    Reset(commands::reset::ResetArgs),

    /// List packaged artifacts available for pickup
    Artifacts(commands::artifacts::ArtifactsArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Write a sample configuration file
    Init(commands::init::InitArgs),
}
