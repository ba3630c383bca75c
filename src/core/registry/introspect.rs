//! Schema introspection
//!
//! Discovers candidate tables for optional datatypes and picks their change
//! tracking column.

use crate::adapters::database::traits::{ColumnInfo, SourceStore};
use crate::domain::{FieldDef, HarvestError, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Timestamp columns tried in order; the first integer match wins
pub const TIMESTAMP_PREFERENCE: [&str; 2] = ["timemodified", "timeupdated"];

/// Converts a `*` glob into an anchored regex
///
/// # Examples
///
/// ```
/// use harvest::core::registry::introspect::glob_to_regex;
///
/// let re = glob_to_regex("backup_*").unwrap();
/// assert!(re.is_match("backup_logs"));
/// assert!(!re.is_match("my_backup_logs"));
/// ```
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
        .map_err(|e| HarvestError::Configuration(format!("Invalid table pattern '{pattern}': {e}")))
}

/// Compiled set of table globs
#[derive(Debug, Clone, Default)]
pub struct TablePatterns {
    patterns: Vec<Regex>,
}

impl TablePatterns {
    pub fn new(globs: &[String]) -> Result<Self> {
        Ok(Self {
            patterns: globs
                .iter()
                .map(|g| glob_to_regex(g))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    pub fn matches(&self, table: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(table))
    }
}

/// Inspects the live store
pub struct SchemaIntrospector {
    source: Arc<dyn SourceStore>,
    excluded: TablePatterns,
}

impl SchemaIntrospector {
    pub fn new(source: Arc<dyn SourceStore>, excluded: TablePatterns) -> Self {
        Self { source, excluded }
    }

    /// Live tables minus excluded globs and tables already claimed
    pub async fn list_candidate_tables(&self, claimed: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let tables = self.source.list_tables().await?;
        Ok(tables
            .into_iter()
            .filter(|table| !claimed.contains(table) && !self.excluded.matches(table))
            .collect())
    }

    pub async fn find_timestamp_column(&self, table: &str) -> Result<Option<String>> {
        let columns = self.source.table_columns(table).await?;
        Ok(pick_timestamp_column(&columns))
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let columns = self.source.table_columns(table).await?;
        Ok(columns.iter().any(|c| c.name == column))
    }

    /// Whether `column` exists and is integer-typed
    pub async fn integer_column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let columns = self.source.table_columns(table).await?;
        Ok(columns.iter().any(|c| c.name == column && c.is_integer()))
    }

    /// Every column as a declared output field
    pub async fn describe_fields(&self, table: &str) -> Result<Vec<FieldDef>> {
        let columns = self.source.table_columns(table).await?;
        Ok(columns
            .into_iter()
            .map(|c| FieldDef::new(c.name, c.kind))
            .collect())
    }
}

/// First integer column named in [`TIMESTAMP_PREFERENCE`]
pub fn pick_timestamp_column(columns: &[ColumnInfo]) -> Option<String> {
    TIMESTAMP_PREFERENCE.iter().find_map(|preferred| {
        columns
            .iter()
            .find(|c| c.name == *preferred && c.is_integer())
            .map(|c| c.name.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::FieldKind;
    use test_case::test_case;

    #[test_case("session*", "sessions", true ; "prefix wildcard")]
    #[test_case("backup_*", "backup_controllers", true ; "underscore prefix")]
    #[test_case("backup_*", "backupx", false ; "literal underscore")]
    #[test_case("*_temp", "grades_temp", true ; "suffix wildcard")]
    #[test_case("cache", "cache_flags", false ; "anchored exact")]
    #[test_case("a.b", "axb", false ; "dot is literal")]
    fn test_glob_matching(glob: &str, table: &str, expected: bool) {
        assert_eq!(glob_to_regex(glob).unwrap().is_match(table), expected);
    }

    #[test]
    fn test_timestamp_preference_order() {
        let columns = vec![
            ColumnInfo::new("id", FieldKind::Integer),
            ColumnInfo::new("timeupdated", FieldKind::Integer),
            ColumnInfo::new("timemodified", FieldKind::Integer),
        ];
        assert_eq!(pick_timestamp_column(&columns), Some("timemodified".to_string()));
    }

    #[test]
    fn test_timestamp_must_be_integer() {
        let columns = vec![
            ColumnInfo::new("timemodified", FieldKind::Text),
            ColumnInfo::new("timeupdated", FieldKind::Integer),
        ];
        assert_eq!(pick_timestamp_column(&columns), Some("timeupdated".to_string()));

        let none = vec![ColumnInfo::new("timemodified", FieldKind::Number)];
        assert_eq!(pick_timestamp_column(&none), None);
    }

    #[tokio::test]
    async fn test_candidates_skip_excluded_and_claimed() {
        let store = MemoryStore::new();
        for table in ["badge", "sessions", "backup_logs", "user"] {
            store.create_table(table, &[("id", FieldKind::Integer)]).unwrap();
        }
        let introspector = SchemaIntrospector::new(
            Arc::new(store),
            TablePatterns::new(&["session*".to_string(), "backup_*".to_string()]).unwrap(),
        );
        let claimed: BTreeSet<String> = ["user".to_string()].into_iter().collect();

        let candidates = introspector.list_candidate_tables(&claimed).await.unwrap();
        assert_eq!(candidates.into_iter().collect::<Vec<_>>(), vec!["badge".to_string()]);
    }

    #[tokio::test]
    async fn test_column_lookup() {
        let store = MemoryStore::new();
        store
            .create_table("badge", &[("id", FieldKind::Integer), ("name", FieldKind::Text)])
            .unwrap();
        let introspector = SchemaIntrospector::new(Arc::new(store), TablePatterns::default());
        assert!(introspector.column_exists("badge", "name").await.unwrap());
        assert!(!introspector.column_exists("badge", "timemodified").await.unwrap());
        assert!(introspector.integer_column_exists("badge", "id").await.unwrap());
        assert!(!introspector.integer_column_exists("badge", "name").await.unwrap());
        assert_eq!(introspector.find_timestamp_column("badge").await.unwrap(), None);

        let fields = introspector.describe_fields("badge").await.unwrap();
        assert_eq!(
            fields,
            vec![
                FieldDef::new("id", FieldKind::Integer),
                FieldDef::new("name", FieldKind::Text),
            ]
        );
    }
}
