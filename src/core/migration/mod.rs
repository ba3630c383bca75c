//! Historical migration
//!
//! A resumable backfill across every datatype, one window per step:
//!
//! ```text
//! NotStarted -> InProgress(datatype, offset) -> ... -> AllComplete
//! ```
//!
//! The position lives in two settings, so a crashed or interrupted run
//! resumes from the last completed window.

pub mod driver;
pub mod state;

pub use driver::{MigrationDriver, MigrationReport, MigrationStep};
pub use state::MigrationState;

/// Settings key holding the epoch the last migration finished at
pub const LAST_MIGRATION_DATE: &str = "migration.last_migration_date";
