//! PostgreSQL adapter implementing the store traits
//!
//! The LMS tables and Harvest's bookkeeping tables live in the same database,
//! so one adapter over one pool serves every seam.

use crate::adapters::database::traits::{
    ArtifactFilter, ArtifactIndex, ColumnInfo, DatatypeConfigStorage, RecordQuery, SettingsStore,
    SourceStore, StagedRecord, StagingStorage, StateStorage,
};
use crate::adapters::postgresql::client::{param_refs, PostgreSQLClient, SqlParam};
use crate::adapters::postgresql::models::{
    artifact_from_row, log_datatype_from_row, PostgreSQLCursor, PostgreSQLDatatypeConfig,
};
use crate::adapters::postgresql::sql;
use crate::core::registry::config::{DatatypeConfig, LogDatatypeDef};
use crate::core::state::cursor::ExportCursor;
use crate::core::state::snapshot::SnapshotChange;
use crate::domain::{
    BufferedRecord, DatatypeName, ExportArtifact, FieldKind, HarvestError, Result, SourceRow,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const UPSERT_CURSOR: &str = r#"
    INSERT INTO harvest_export_log (
        datatype, last_exported_time, last_exported_id, records_count,
        records_migrated, migrated, time_start
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (datatype) DO UPDATE SET
        last_exported_time = EXCLUDED.last_exported_time,
        last_exported_id = EXCLUDED.last_exported_id,
        records_count = EXCLUDED.records_count,
        records_migrated = EXCLUDED.records_migrated,
        migrated = EXCLUDED.migrated,
        time_start = EXCLUDED.time_start
"#;

/// Maps an `information_schema` data type onto a field kind
pub fn column_kind(data_type: &str) -> FieldKind {
    match data_type {
        "smallint" | "integer" | "bigint" => FieldKind::Integer,
        "numeric" | "real" | "double precision" | "decimal" => FieldKind::Number,
        "boolean" => FieldKind::Boolean,
        _ => FieldKind::Text,
    }
}

/// PostgreSQL implementation of the store traits
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Create a new PostgreSQL adapter with an Arc-wrapped client
    pub fn new_with_arc(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    async fn run_query(&self, statement: sql::Statement) -> Result<Vec<tokio_postgres::Row>> {
        tracing::trace!(sql = %statement.sql, "Executing source query");
        self.client
            .query(&statement.sql, &param_refs(&statement.params))
            .await
    }
}

#[async_trait]
impl SourceStore for PostgreSQLAdapter {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT table_name::text AS table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await?;

        let prefix = self.client.table_prefix();
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name: String = row.get("table_name");
                name.strip_prefix(prefix).map(str::to_string)
            })
            .filter(|name| !name.is_empty())
            .collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let full_name = format!("{}{}", self.client.table_prefix(), table);
        let rows = self
            .client
            .query(
                "SELECT column_name::text AS column_name, data_type::text AS data_type \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[&full_name],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let data_type: String = row.get("data_type");
                ColumnInfo::new(name, column_kind(&data_type))
            })
            .collect())
    }

    async fn fetch_rows(&self, query: &RecordQuery) -> Result<Vec<SourceRow>> {
        let statement = sql::select_rows(query, self.client.table_prefix())?;
        let rows = self.run_query(statement).await?;

        rows.iter()
            .map(|row| {
                let doc: Value = row.get("doc");
                match doc {
                    Value::Object(values) => {
                        SourceRow::from_values(values).map_err(HarvestError::Database)
                    }
                    other => Err(HarvestError::Database(format!(
                        "Expected a row object, got {other}"
                    ))),
                }
            })
            .collect()
    }

    async fn count_rows(&self, query: &RecordQuery) -> Result<u64> {
        let statement = sql::count_rows(query, self.client.table_prefix())?;
        let rows = self.run_query(statement).await?;
        let count: i64 = rows.first().map(|row| row.get("n")).unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    async fn fetch_ids(&self, table: &str) -> Result<Vec<i64>> {
        let statement = sql::select_ids(table, self.client.table_prefix())?;
        let rows = self.run_query(statement).await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}

#[async_trait]
impl StateStorage for PostgreSQLAdapter {
    async fn load_cursor(&self, datatype: &DatatypeName) -> Result<Option<ExportCursor>> {
        let rows = self
            .client
            .query(
                "SELECT * FROM harvest_export_log WHERE datatype = $1",
                &[&datatype.as_str()],
            )
            .await?;

        match rows.first() {
            Some(row) => Ok(Some(PostgreSQLCursor::from_row(row).to_domain()?)),
            None => {
                tracing::debug!(datatype = %datatype, "No cursor found (first export)");
                Ok(None)
            }
        }
    }

    async fn save_cursor(&self, cursor: &ExportCursor) -> Result<()> {
        let row = PostgreSQLCursor::from_domain(cursor);
        self.client
            .execute(
                UPSERT_CURSOR,
                &[
                    &row.datatype,
                    &row.last_exported_time,
                    &row.last_exported_id,
                    &row.records_count,
                    &row.records_migrated,
                    &row.migrated,
                    &row.time_start,
                ],
            )
            .await
            .map_err(|e| HarvestError::State(format!("Failed to save cursor: {e}")))?;
        Ok(())
    }

    async fn commit_batch(
        &self,
        cursor: &ExportCursor,
        snapshot: Option<&SnapshotChange>,
    ) -> Result<()> {
        let row = PostgreSQLCursor::from_domain(cursor);
        let mut conn = self.client.get_connection().await?;
        let tx = conn.transaction().await?;

        tx.execute(
            UPSERT_CURSOR,
            &[
                &row.datatype,
                &row.last_exported_time,
                &row.last_exported_id,
                &row.records_count,
                &row.records_migrated,
                &row.migrated,
                &row.time_start,
            ],
        )
        .await?;

        if let Some(change) = snapshot {
            if !change.removed.is_empty() {
                tx.execute(
                    "DELETE FROM harvest_export_ids WHERE datatype = $1 AND data_id = ANY($2)",
                    &[&change.datatype.as_str(), &change.removed],
                )
                .await?;
            }
            if !change.inserted.is_empty() {
                tx.execute(
                    "INSERT INTO harvest_export_ids (datatype, data_id, time_created) \
                     SELECT $1, ids.id, $3 FROM unnest($2::bigint[]) AS ids(id) \
                     ON CONFLICT (datatype, data_id) DO NOTHING",
                    &[&change.datatype.as_str(), &change.inserted, &change.time_created],
                )
                .await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| HarvestError::State(format!("Failed to commit batch: {e}")))?;

        tracing::debug!(
            datatype = %cursor.datatype,
            last_exported_id = cursor.last_exported_id,
            last_exported_time = cursor.last_exported_time,
            "Batch committed"
        );
        Ok(())
    }

    async fn all_cursors(&self) -> Result<Vec<ExportCursor>> {
        let rows = self
            .client
            .query("SELECT * FROM harvest_export_log ORDER BY datatype", &[])
            .await?;
        rows.iter()
            .map(|row| PostgreSQLCursor::from_row(row).to_domain())
            .collect()
    }

    async fn reset_cursors(&self) -> Result<()> {
        let updated = self
            .client
            .execute(
                "UPDATE harvest_export_log SET last_exported_time = 0, last_exported_id = 0, \
                 records_count = 0, records_migrated = 0, migrated = FALSE, time_start = 0",
                &[],
            )
            .await?;
        tracing::info!(cursors = updated, "Export cursors reset");
        Ok(())
    }

    async fn snapshot_ids(&self, datatype: &DatatypeName) -> Result<Vec<i64>> {
        let rows = self
            .client
            .query(
                "SELECT data_id FROM harvest_export_ids WHERE datatype = $1 ORDER BY data_id",
                &[&datatype.as_str()],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get("data_id")).collect())
    }
}

#[async_trait]
impl SettingsStore for PostgreSQLAdapter {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let rows = self
            .client
            .query("SELECT value FROM harvest_settings WHERE name = $1", &[&key])
            .await?;
        Ok(rows.first().map(|row| row.get("value")))
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO harvest_settings (name, value) VALUES ($1, $2) \
                 ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value",
                &[&key, &value],
            )
            .await?;
        Ok(())
    }

    async fn set_setting_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let inserted = self
            .client
            .execute(
                "INSERT INTO harvest_settings (name, value) VALUES ($1, $2) \
                 ON CONFLICT (name) DO NOTHING",
                &[&key, &value],
            )
            .await?;
        Ok(inserted == 1)
    }

    async fn delete_setting(&self, key: &str) -> Result<()> {
        self.client
            .execute("DELETE FROM harvest_settings WHERE name = $1", &[&key])
            .await?;
        Ok(())
    }

    async fn set_settings(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut conn = self.client.get_connection().await?;
        let tx = conn.transaction().await?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO harvest_settings (name, value) VALUES ($1, $2) \
                 ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value",
                &[key, value],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_setting_if(&self, key: &str, expected: &str) -> Result<bool> {
        let deleted = self
            .client
            .execute(
                "DELETE FROM harvest_settings WHERE name = $1 AND value = $2",
                &[&key, &expected],
            )
            .await?;
        Ok(deleted == 1)
    }
}

#[async_trait]
impl DatatypeConfigStorage for PostgreSQLAdapter {
    async fn load_datatype_config(
        &self,
        datatype: &DatatypeName,
    ) -> Result<Option<DatatypeConfig>> {
        let rows = self
            .client
            .query(
                "SELECT * FROM harvest_config WHERE datatype = $1",
                &[&datatype.as_str()],
            )
            .await?;
        rows.first()
            .map(|row| PostgreSQLDatatypeConfig::from_row(row).to_domain())
            .transpose()
    }

    async fn save_datatype_config(&self, config: &DatatypeConfig) -> Result<()> {
        let row = PostgreSQLDatatypeConfig::from_domain(config);
        self.client
            .execute(
                r#"
                INSERT INTO harvest_config (
                    datatype, status, table_type, timemodified_field, filter_by_id,
                    rewritable, storage, time_created, time_modified
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (datatype) DO UPDATE SET
                    status = EXCLUDED.status,
                    table_type = EXCLUDED.table_type,
                    timemodified_field = EXCLUDED.timemodified_field,
                    filter_by_id = EXCLUDED.filter_by_id,
                    rewritable = EXCLUDED.rewritable,
                    storage = EXCLUDED.storage,
                    time_modified = EXCLUDED.time_modified
                "#,
                &[
                    &row.datatype,
                    &row.status,
                    &row.table_type,
                    &row.timemodified_field,
                    &row.filter_by_id,
                    &row.rewritable,
                    &row.storage,
                    &row.time_created,
                    &row.time_modified,
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_log_datatypes(&self) -> Result<Vec<LogDatatypeDef>> {
        let rows = self
            .client
            .query(
                "SELECT datatype, log_table, events FROM harvest_logs \
                 WHERE enabled ORDER BY datatype",
                &[],
            )
            .await?;
        rows.iter().map(log_datatype_from_row).collect()
    }
}

#[async_trait]
impl StagingStorage for PostgreSQLAdapter {
    async fn insert_staged(&self, record: &BufferedRecord) -> Result<i64> {
        let rows = self
            .client
            .query(
                "INSERT INTO harvest_staging (datatype, crud, data_id, line) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
                &[
                    &record.datatype.as_str(),
                    &record.crud.as_str(),
                    &record.data_id,
                    &record.line,
                ],
            )
            .await
            .map_err(|e| HarvestError::Storage(format!("Failed to stage record: {e}")))?;
        rows.first()
            .map(|row| row.get("id"))
            .ok_or_else(|| HarvestError::Storage("Staging insert returned no id".to_string()))
    }

    async fn max_staged_id(&self, datatype: &DatatypeName) -> Result<Option<i64>> {
        let rows = self
            .client
            .query(
                "SELECT MAX(id) AS max_id FROM harvest_staging WHERE datatype = $1",
                &[&datatype.as_str()],
            )
            .await?;
        Ok(rows.first().and_then(|row| row.get("max_id")))
    }

    async fn fetch_staged(
        &self,
        datatype: &DatatypeName,
        after_id: i64,
        up_to_id: i64,
        limit: u64,
    ) -> Result<Vec<StagedRecord>> {
        let limit = limit as i64;
        let rows = self
            .client
            .query(
                "SELECT id, line FROM harvest_staging \
                 WHERE datatype = $1 AND id > $2 AND id <= $3 ORDER BY id LIMIT $4",
                &[&datatype.as_str(), &after_id, &up_to_id, &limit],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| StagedRecord {
                id: row.get("id"),
                line: row.get("line"),
            })
            .collect())
    }

    async fn purge_staged(&self, datatype: &DatatypeName, up_to_id: i64) -> Result<u64> {
        self.client
            .execute(
                "DELETE FROM harvest_staging WHERE datatype = $1 AND id <= $2",
                &[&datatype.as_str(), &up_to_id],
            )
            .await
    }

    async fn delete_staged(&self, datatype: &DatatypeName) -> Result<u64> {
        self.client
            .execute(
                "DELETE FROM harvest_staging WHERE datatype = $1",
                &[&datatype.as_str()],
            )
            .await
    }
}

#[async_trait]
impl ArtifactIndex for PostgreSQLAdapter {
    async fn insert_artifact(&self, artifact: &ExportArtifact) -> Result<i64> {
        let path = artifact.path.to_string_lossy().to_string();
        let record_count = artifact.record_count as i64;
        let size_bytes = artifact.size_bytes as i64;
        let rows = self
            .client
            .query(
                "INSERT INTO harvest_artifacts \
                 (datatype, filename, path, format, record_count, size_bytes, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                &[
                    &artifact.datatype.as_str(),
                    &artifact.filename,
                    &path,
                    &artifact.format.extension(),
                    &record_count,
                    &size_bytes,
                    &artifact.created_at,
                ],
            )
            .await?;
        rows.first()
            .map(|row| row.get("id"))
            .ok_or_else(|| HarvestError::Storage("Artifact insert returned no id".to_string()))
    }

    async fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<ExportArtifact>> {
        let mut predicates = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();

        if let Some(datatype) = &filter.datatype {
            params.push(Box::new(datatype.to_string()));
            predicates.push(format!("datatype = ${}", params.len()));
        }
        if let Some(since_time) = filter.since_time {
            params.push(Box::new(since_time));
            predicates.push(format!("created_at > ${}", params.len()));
        }
        if let Some(since_id) = filter.since_id {
            params.push(Box::new(since_id));
            predicates.push(format!("id > ${}", params.len()));
        }

        let mut query = "SELECT * FROM harvest_artifacts".to_string();
        if !predicates.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&predicates.join(" AND "));
        }
        query.push_str(" ORDER BY id");

        let rows = self.client.query(&query, &param_refs(&params)).await?;
        rows.iter().map(artifact_from_row).collect()
    }

    async fn delete_artifacts(&self, datatype: &DatatypeName) -> Result<Vec<ExportArtifact>> {
        let rows = self
            .client
            .query(
                "DELETE FROM harvest_artifacts WHERE datatype = $1 RETURNING *",
                &[&datatype.as_str()],
            )
            .await?;
        rows.iter().map(artifact_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_kind_mapping() {
        assert_eq!(column_kind("bigint"), FieldKind::Integer);
        assert_eq!(column_kind("smallint"), FieldKind::Integer);
        assert_eq!(column_kind("numeric"), FieldKind::Number);
        assert_eq!(column_kind("boolean"), FieldKind::Boolean);
        assert_eq!(column_kind("character varying"), FieldKind::Text);
        assert_eq!(column_kind("text"), FieldKind::Text);
    }
}
