//! In-memory implementation of every store trait
//!
//! Holds LMS tables and bookkeeping state behind a single mutex. Used by the
//! integration tests and by dry runs that must not touch a real database.

use crate::adapters::database::traits::{
    ArtifactFilter, ArtifactIndex, ColumnInfo, DatatypeConfigStorage, RecordFilter, RecordQuery,
    SettingsStore, SourceStore, StagedRecord, StagingStorage, StateStorage,
};
use crate::core::registry::config::{DatatypeConfig, LogDatatypeDef};
use crate::core::state::cursor::ExportCursor;
use crate::core::state::snapshot::SnapshotChange;
use crate::domain::{
    BufferedRecord, DataSource, DatatypeName, ExportArtifact, FieldKind, HarvestError, Result,
    SourceRow,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    rows: BTreeMap<i64, Map<String, Value>>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, MemoryTable>,
    /// Computed query text -> table serving its rows
    views: HashMap<String, String>,
    cursors: BTreeMap<DatatypeName, ExportCursor>,
    snapshots: BTreeMap<DatatypeName, BTreeMap<i64, i64>>,
    settings: BTreeMap<String, String>,
    datatype_configs: BTreeMap<DatatypeName, DatatypeConfig>,
    log_datatypes: Vec<LogDatatypeDef>,
    staging: BTreeMap<i64, BufferedRecord>,
    next_staging_id: i64,
    artifacts: BTreeMap<i64, ExportArtifact>,
    next_artifact_id: i64,
    fail_next_commit: bool,
    fail_source_reads: bool,
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| HarvestError::State("memory store lock poisoned".to_string()))
    }

    /// Creates (or replaces) a table with the given columns
    pub fn create_table(&self, name: &str, columns: &[(&str, FieldKind)]) -> Result<()> {
        let mut inner = self.lock()?;
        inner.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns
                    .iter()
                    .map(|(column, kind)| ColumnInfo::new(*column, *kind))
                    .collect(),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Inserts or replaces a row; the object must carry an integer `id`
    pub fn insert_row(&self, table: &str, row: Value) -> Result<i64> {
        let Value::Object(values) = row else {
            return Err(HarvestError::Validation("row must be a JSON object".to_string()));
        };
        let id = value_i64(values.get("id"))
            .ok_or_else(|| HarvestError::Validation("row has no integer id".to_string()))?;

        let mut inner = self.lock()?;
        let table = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| HarvestError::Database(format!("no such table: {table}")))?;
        table.rows.insert(id, values);
        Ok(id)
    }

    /// Merges `patch` into an existing row
    pub fn update_row(&self, table: &str, id: i64, patch: Value) -> Result<()> {
        let Value::Object(patch) = patch else {
            return Err(HarvestError::Validation("patch must be a JSON object".to_string()));
        };
        let mut inner = self.lock()?;
        let row = inner
            .tables
            .get_mut(table)
            .and_then(|t| t.rows.get_mut(&id))
            .ok_or_else(|| HarvestError::Database(format!("no row {id} in {table}")))?;
        row.extend(patch);
        Ok(())
    }

    /// Removes a row, returning whether it existed
    pub fn delete_row(&self, table: &str, id: i64) -> Result<bool> {
        let mut inner = self.lock()?;
        Ok(inner
            .tables
            .get_mut(table)
            .map(|t| t.rows.remove(&id).is_some())
            .unwrap_or(false))
    }

    /// Serves a computed query from a table's rows
    pub fn register_query(&self, sql: &str, table: &str) -> Result<()> {
        self.lock()?
            .views
            .insert(sql.to_string(), table.to_string());
        Ok(())
    }

    pub fn add_log_datatype(&self, def: LogDatatypeDef) -> Result<()> {
        self.lock()?.log_datatypes.push(def);
        Ok(())
    }

    /// Makes the next `commit_batch` fail without changing anything
    pub fn fail_next_commit(&self) -> Result<()> {
        self.lock()?.fail_next_commit = true;
        Ok(())
    }

    /// Makes every source read fail until switched off
    pub fn set_source_failure(&self, failing: bool) -> Result<()> {
        self.lock()?.fail_source_reads = failing;
        Ok(())
    }

    /// Number of staged records for a datatype
    pub fn staged_count(&self, datatype: &DatatypeName) -> Result<usize> {
        Ok(self
            .lock()?
            .staging
            .values()
            .filter(|r| &r.datatype == datatype)
            .count())
    }

    fn matching_rows(inner: &Inner, query: &RecordQuery, keyset: bool) -> Result<Vec<SourceRow>> {
        if inner.fail_source_reads {
            return Err(HarvestError::Database("connection reset by peer".to_string()));
        }

        let table_name = match &query.source {
            DataSource::Table(table) => table.clone(),
            DataSource::Query(sql) => inner
                .views
                .get(sql)
                .cloned()
                .ok_or_else(|| HarvestError::Database(format!("unknown query: {sql}")))?,
        };
        let table = inner
            .tables
            .get(&table_name)
            .ok_or_else(|| HarvestError::Database(format!("no such table: {table_name}")))?;

        let mut rows = Vec::new();
        for (id, values) in &table.rows {
            let id = *id;
            let conditions_hold = query.conditions.iter().all(|condition| {
                values
                    .get(&condition.column)
                    .and_then(value_text)
                    .map(|text| condition.values.contains(&text))
                    .unwrap_or(false)
            });
            let filter_holds = match &query.filter {
                RecordFilter::None => true,
                RecordFilter::ModifiedAfter { column, since } => {
                    value_i64(values.get(column)).map_or(false, |t| t > *since)
                }
                RecordFilter::IdAfter(after) => id > *after,
            };
            let keyset_holds = !keyset || query.after_id.map_or(true, |after| id > after);
            let bound_holds = query.up_to_id.map_or(true, |bound| id <= bound);

            if conditions_hold && filter_holds && keyset_holds && bound_holds {
                let row = SourceRow::from_values(values.clone()).map_err(HarvestError::Database)?;
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.tables.keys().cloned().collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self
            .lock()?
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn fetch_rows(&self, query: &RecordQuery) -> Result<Vec<SourceRow>> {
        let inner = self.lock()?;
        let rows = Self::matching_rows(&inner, query, true)?;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(limit)
            .collect())
    }

    async fn count_rows(&self, query: &RecordQuery) -> Result<u64> {
        let inner = self.lock()?;
        Ok(Self::matching_rows(&inner, query, false)?.len() as u64)
    }

    async fn fetch_ids(&self, table: &str) -> Result<Vec<i64>> {
        let inner = self.lock()?;
        if inner.fail_source_reads {
            return Err(HarvestError::Database("connection reset by peer".to_string()));
        }
        inner
            .tables
            .get(table)
            .map(|t| t.rows.keys().copied().collect())
            .ok_or_else(|| HarvestError::Database(format!("no such table: {table}")))
    }
}

#[async_trait]
impl StateStorage for MemoryStore {
    async fn load_cursor(&self, datatype: &DatatypeName) -> Result<Option<ExportCursor>> {
        Ok(self.lock()?.cursors.get(datatype).cloned())
    }

    async fn save_cursor(&self, cursor: &ExportCursor) -> Result<()> {
        self.lock()?
            .cursors
            .insert(cursor.datatype.clone(), cursor.clone());
        Ok(())
    }

    async fn commit_batch(
        &self,
        cursor: &ExportCursor,
        snapshot: Option<&SnapshotChange>,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.fail_next_commit {
            inner.fail_next_commit = false;
            return Err(HarvestError::State(
                "Failed to commit batch: connection lost".to_string(),
            ));
        }

        inner
            .cursors
            .insert(cursor.datatype.clone(), cursor.clone());

        if let Some(change) = snapshot {
            let ids = inner.snapshots.entry(change.datatype.clone()).or_default();
            for id in &change.removed {
                ids.remove(id);
            }
            for id in &change.inserted {
                ids.entry(*id).or_insert(change.time_created);
            }
        }
        Ok(())
    }

    async fn all_cursors(&self) -> Result<Vec<ExportCursor>> {
        Ok(self.lock()?.cursors.values().cloned().collect())
    }

    async fn reset_cursors(&self) -> Result<()> {
        for cursor in self.lock()?.cursors.values_mut() {
            cursor.reset();
        }
        Ok(())
    }

    async fn snapshot_ids(&self, datatype: &DatatypeName) -> Result<Vec<i64>> {
        Ok(self
            .lock()?
            .snapshots
            .get(datatype)
            .map(|ids| ids.keys().copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_setting_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.settings.contains_key(key) {
            return Ok(false);
        }
        inner.settings.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn delete_setting(&self, key: &str) -> Result<()> {
        self.lock()?.settings.remove(key);
        Ok(())
    }

    async fn set_settings(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut inner = self.lock()?;
        for (key, value) in entries {
            inner.settings.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    async fn delete_setting_if(&self, key: &str, expected: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.settings.get(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        inner.settings.remove(key);
        Ok(true)
    }
}

#[async_trait]
impl DatatypeConfigStorage for MemoryStore {
    async fn load_datatype_config(
        &self,
        datatype: &DatatypeName,
    ) -> Result<Option<DatatypeConfig>> {
        Ok(self.lock()?.datatype_configs.get(datatype).cloned())
    }

    async fn save_datatype_config(&self, config: &DatatypeConfig) -> Result<()> {
        self.lock()?
            .datatype_configs
            .insert(config.datatype.clone(), config.clone());
        Ok(())
    }

    async fn list_log_datatypes(&self) -> Result<Vec<LogDatatypeDef>> {
        Ok(self.lock()?.log_datatypes.clone())
    }
}

#[async_trait]
impl StagingStorage for MemoryStore {
    async fn insert_staged(&self, record: &BufferedRecord) -> Result<i64> {
        let mut inner = self.lock()?;
        inner.next_staging_id += 1;
        let id = inner.next_staging_id;
        inner.staging.insert(id, record.clone());
        Ok(id)
    }

    async fn max_staged_id(&self, datatype: &DatatypeName) -> Result<Option<i64>> {
        Ok(self
            .lock()?
            .staging
            .iter()
            .rev()
            .find(|(_, r)| &r.datatype == datatype)
            .map(|(id, _)| *id))
    }

    async fn fetch_staged(
        &self,
        datatype: &DatatypeName,
        after_id: i64,
        up_to_id: i64,
        limit: u64,
    ) -> Result<Vec<StagedRecord>> {
        if after_id >= up_to_id {
            return Ok(Vec::new());
        }
        Ok(self
            .lock()?
            .staging
            .range(after_id + 1..=up_to_id)
            .filter(|(_, r)| &r.datatype == datatype)
            .take(limit as usize)
            .map(|(id, r)| StagedRecord {
                id: *id,
                line: r.line.clone(),
            })
            .collect())
    }

    async fn purge_staged(&self, datatype: &DatatypeName, up_to_id: i64) -> Result<u64> {
        let mut inner = self.lock()?;
        let before = inner.staging.len();
        inner
            .staging
            .retain(|id, r| !(&r.datatype == datatype && *id <= up_to_id));
        Ok((before - inner.staging.len()) as u64)
    }

    async fn delete_staged(&self, datatype: &DatatypeName) -> Result<u64> {
        let mut inner = self.lock()?;
        let before = inner.staging.len();
        inner.staging.retain(|_, r| &r.datatype != datatype);
        Ok((before - inner.staging.len()) as u64)
    }
}

#[async_trait]
impl ArtifactIndex for MemoryStore {
    async fn insert_artifact(&self, artifact: &ExportArtifact) -> Result<i64> {
        let mut inner = self.lock()?;
        inner.next_artifact_id += 1;
        let id = inner.next_artifact_id;
        let mut stored = artifact.clone();
        stored.id = id;
        inner.artifacts.insert(id, stored);
        Ok(id)
    }

    async fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<ExportArtifact>> {
        Ok(self
            .lock()?
            .artifacts
            .values()
            .filter(|a| filter.datatype.as_ref().map_or(true, |d| &a.datatype == d))
            .filter(|a| filter.since_time.map_or(true, |t| a.created_at > t))
            .filter(|a| filter.since_id.map_or(true, |id| a.id > id))
            .cloned()
            .collect())
    }

    async fn delete_artifacts(&self, datatype: &DatatypeName) -> Result<Vec<ExportArtifact>> {
        let mut inner = self.lock()?;
        let (removed, kept): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut inner.artifacts)
            .into_iter()
            .partition(|(_, a)| &a.datatype == datatype);
        inner.artifacts = kept;
        Ok(removed.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RowFilter;
    use serde_json::json;

    fn store_with_users() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_table(
                "user",
                &[("id", FieldKind::Integer), ("timemodified", FieldKind::Integer)],
            )
            .unwrap();
        for (id, t) in [(1, 100), (2, 200), (3, 300), (4, 400)] {
            store
                .insert_row("user", json!({"id": id, "timemodified": t, "auth": "manual"}))
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_fetch_rows_filters_and_pages() {
        let store = store_with_users();
        let query = RecordQuery::new(DataSource::Table("user".to_string()))
            .with_filter(RecordFilter::ModifiedAfter {
                column: "timemodified".to_string(),
                since: 150,
            })
            .with_limit(2);

        let rows = store.fetch_rows(&query).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3]);

        let next = store.fetch_rows(&query.clone().with_after_id(3)).await.unwrap();
        assert_eq!(next.iter().map(|r| r.id).collect::<Vec<_>>(), vec![4]);

        assert_eq!(store.count_rows(&query.with_after_id(3)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_conditions_match_text() {
        let store = store_with_users();
        let mut query = RecordQuery::new(DataSource::Table("user".to_string()));
        query.conditions.push(RowFilter {
            column: "auth".to_string(),
            values: vec!["ldap".to_string()],
        });
        assert_eq!(store.count_rows(&query).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_state_untouched() {
        let store = store_with_users();
        let mut cursor = ExportCursor::new(DatatypeName::new("users").unwrap());
        cursor.apply_batch(Some(4), 1000, Some(4));

        store.fail_next_commit().unwrap();
        assert!(store.commit_batch(&cursor, None).await.is_err());
        assert!(store.load_cursor(&cursor.datatype).await.unwrap().is_none());

        store.commit_batch(&cursor, None).await.unwrap();
        assert_eq!(store.load_cursor(&cursor.datatype).await.unwrap(), Some(cursor));
    }

    #[tokio::test]
    async fn test_settings_if_absent() {
        let store = MemoryStore::new();
        assert!(store.set_setting_if_absent("k", "1").await.unwrap());
        assert!(!store.set_setting_if_absent("k", "2").await.unwrap());
        assert_eq!(store.get_setting("k").await.unwrap().as_deref(), Some("1"));
    }
}
