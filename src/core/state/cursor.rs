//! Export cursor model
//!
//! One cursor row exists per datatype. It records where the last successful
//! batch left off so the next pass can resume from there.

use crate::domain::ids::DatatypeName;
use serde::{Deserialize, Serialize};

/// Persisted per-datatype export bookkeeping
///
/// # Examples
///
/// ```
/// use harvest::core::state::cursor::ExportCursor;
/// use harvest::domain::DatatypeName;
///
/// let mut cursor = ExportCursor::new(DatatypeName::new("courses").unwrap());
/// assert!(cursor.is_new());
///
/// cursor.apply_batch(Some(1000), 1_700_000_000, Some(1000));
/// assert_eq!(cursor.last_exported_id, 1000);
/// assert_eq!(cursor.time_start, 1_700_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportCursor {
    /// Datatype this cursor tracks
    pub datatype: DatatypeName,

    /// Epoch seconds of the last successful batch (0 = never)
    pub last_exported_time: i64,

    /// Highest source id exported so far
    pub last_exported_id: i64,

    /// Total rows in the source at the last count
    pub records_count: u64,

    /// Rows with `id <= last_exported_id` at the last batch
    pub records_migrated: u64,

    /// Historical backfill finished
    pub migrated: bool,

    /// Epoch seconds of the first-ever batch (0 = never)
    pub time_start: i64,
}

impl ExportCursor {
    /// Creates an empty cursor for a datatype that was never exported
    pub fn new(datatype: DatatypeName) -> Self {
        Self {
            datatype,
            last_exported_time: 0,
            last_exported_id: 0,
            records_count: 0,
            records_migrated: 0,
            migrated: false,
            time_start: 0,
        }
    }

    /// Whether no batch was ever recorded
    pub fn is_new(&self) -> bool {
        self.time_start == 0
    }

    /// `(last_exported_time, last_exported_id)` pair used to build queries
    pub fn position(&self) -> (i64, i64) {
        (self.last_exported_time, self.last_exported_id)
    }

    /// Applies a successful batch
    ///
    /// Both the exported time and the exported id only ever move forward,
    /// whatever order batches are recorded in. `time_start` is set once.
    pub fn apply_batch(
        &mut self,
        last_id: Option<i64>,
        exported_at: i64,
        records_migrated: Option<u64>,
    ) {
        if self.time_start == 0 {
            self.time_start = exported_at;
        }
        self.last_exported_time = self.last_exported_time.max(exported_at);

        if let Some(id) = last_id {
            self.last_exported_id = self.last_exported_id.max(id);
            if let Some(count) = records_migrated {
                self.records_migrated = count;
            }
        }
    }

    /// Zeroes every field except the datatype
    pub fn reset(&mut self) {
        *self = Self::new(self.datatype.clone());
    }

    /// Migration progress as a percentage of `records_count`
    pub fn progress_pct(&self) -> f64 {
        if self.migrated {
            return 100.0;
        }
        if self.records_count == 0 {
            return 0.0;
        }
        (self.records_migrated as f64 / self.records_count as f64 * 100.0).min(100.0)
    }
}
