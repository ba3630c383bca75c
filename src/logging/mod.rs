//! Logging and observability
//!
//! Structured logging with configurable levels and optional JSON file output
//! with rotation.
//!
//! # Example
//!
//! ```no_run
//! use harvest::logging::init_logging;
//! use harvest::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(datatype = "users", records = 42, "Batch exported");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use harvest::log_error_with_context;
/// use harvest::domain::HarvestError;
///
/// let error = HarvestError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log migration progress for a datatype
///
/// # Example
///
/// ```no_run
/// use harvest::log_migration_progress;
///
/// log_migration_progress!("courses", 1000, 2500);
/// ```
#[macro_export]
macro_rules! log_migration_progress {
    ($datatype:expr, $done:expr, $total:expr) => {
        tracing::info!(
            datatype = %$datatype,
            done = $done,
            total = $total,
            progress_pct = if $total == 0 { 100.0 } else { $done as f64 / $total as f64 * 100.0 },
            "Migration progress"
        );
    };
}
