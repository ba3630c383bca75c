//! Configuration management for Harvest.
//!
//! Harvest reads a TOML file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `HARVEST_<SECTION>_<KEY>` overrides
//! - Default values for optional settings
//! - Per-section validation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use harvest::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("harvest.toml")?;
//! println!("Export format: {}", config.export.format);
//! println!("Migration window: {}", config.migration.batch_limit);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level, dry run
//! - [`DatabaseConfig`] - LMS connection, table prefix, pool sizing
//! - [`ExportConfig`] - format, storage backend, thresholds, table patterns
//! - [`MigrationConfig`] - migration window size
//! - [`StorageConfig`] - buffer and artifact directories
//! - [`LoggingConfig`] - local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [database]
//! connection_string = "${HARVEST_DB_URL}"
//! table_prefix = "mdl_"
//!
//! [export]
//! format = "json"
//! default_storage = "database"
//! excluded_tables = ["session*", "cache_*"]
//!
//! [migration]
//! batch_limit = 1000
//!
//! [storage]
//! buffer_dir = "/var/lib/harvest/buffer"
//! artifacts_dir = "/var/lib/harvest/artifacts"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, load_config_str};
pub use schema::{
    ApplicationConfig, DatabaseConfig, ExportConfig, HarvestConfig, LoggingConfig,
    MigrationConfig, StorageConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
