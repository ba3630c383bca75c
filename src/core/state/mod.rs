// Export cursors and id snapshots

pub mod cursor;
pub mod manager;
pub mod snapshot;

pub use cursor::ExportCursor;
pub use manager::CursorStore;
pub use snapshot::{IdDiff, IdDiffReconciler, Reconciliation, SnapshotChange};
