//! Shared fixtures for integration tests
//!
//! Every test runs the real pipeline against the in-memory adapter with
//! buffer and artifact directories in a temp dir.

#![allow(dead_code)]

use harvest::adapters::database::Stores;
use harvest::adapters::memory::MemoryStore;
use harvest::config::{load_config_str, HarvestConfig};
use harvest::core::registry::catalogue::TRACKING_LOG_QUERY;
use harvest::core::transform::declared_fields;
use harvest::core::Pipeline;
use harvest::domain::{DatatypeDescriptor, ExportArtifact, FieldKind, TransformKind};
use serde_json::{Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Rows served for the tracking-log query; excluded from discovery
pub const TRACKING_SOURCE: &str = "cache_tracking_summary";

/// Required tables and the transform whose columns they carry
pub const REQUIRED_TABLES: &[(&str, TransformKind)] = &[
    ("user", TransformKind::User),
    ("course_categories", TransformKind::Category),
    ("course", TransformKind::Course),
    ("user_enrolments", TransformKind::Enrolment),
    ("role_assignments", TransformKind::RoleAssignment),
    ("groups", TransformKind::Group),
    ("groups_members", TransformKind::GroupMember),
    ("course_modules", TransformKind::Activity),
    ("grade_items", TransformKind::GradeItem),
    ("grade_grades", TransformKind::Grade),
    ("forum_posts", TransformKind::ForumPost),
    ("quiz_attempts", TransformKind::QuizAttempt),
    ("logstore_standard_log", TransformKind::LogEvent),
    (TRACKING_SOURCE, TransformKind::TrackingLog),
];

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub pipeline: Arc<Pipeline>,
    pub config: HarvestConfig,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config("json", "database", |_| {})
    }

    pub fn with_config(format: &str, storage: &str, tweak: impl FnOnce(&mut HarvestConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = load_config_str(&format!(
            r#"
[database]
connection_string = "postgresql://harvest:pw@localhost:5432/moodle"

[export]
format = "{format}"
default_storage = "{storage}"
flush_threshold = 50
page_size = 100

[storage]
buffer_dir = "{buffer}"
artifacts_dir = "{artifacts}"

[logging]
local_enabled = false
"#,
            buffer = dir.path().join("buffer").display(),
            artifacts = dir.path().join("artifacts").display(),
        ))
        .unwrap();
        tweak(&mut config);

        let store = Arc::new(MemoryStore::new());
        create_required_tables(&store);

        let pipeline =
            Arc::new(Pipeline::new(Stores::from_adapter(store.clone()), &config).unwrap());

        Self {
            store,
            pipeline,
            config,
            dir,
        }
    }

    /// Inserts rows `ids` into `table`, filling every declared column
    pub fn seed(&self, table: &str, kind: TransformKind, ids: impl IntoIterator<Item = i64>, extra: impl Fn(i64) -> Value) {
        for id in ids {
            self.store.insert_row(table, row(kind, id, extra(id))).unwrap();
        }
    }

    pub async fn descriptor(&self, name: &str) -> DatatypeDescriptor {
        self.pipeline.registry.resolve(name).await.unwrap()
    }
}

/// Column list of a transform, plus the raw columns its derived fields read
pub fn columns(kind: TransformKind) -> Vec<(String, FieldKind)> {
    let mut columns: Vec<(String, FieldKind)> = declared_fields(kind)
        .into_iter()
        .map(|f| (f.name, f.kind))
        .collect();
    if kind == TransformKind::LogEvent {
        columns.push(("crud".to_string(), FieldKind::Text));
    }
    columns
}

pub fn create_required_tables(store: &MemoryStore) {
    for (table, kind) in REQUIRED_TABLES {
        let owned = columns(*kind);
        let borrowed: Vec<(&str, FieldKind)> =
            owned.iter().map(|(name, kind)| (name.as_str(), *kind)).collect();
        store.create_table(table, &borrowed).unwrap();
    }
    store.register_query(TRACKING_LOG_QUERY, TRACKING_SOURCE).unwrap();
}

/// A row carrying a neutral value in every column of `kind`, then `extra`
pub fn row(kind: TransformKind, id: i64, extra: Value) -> Value {
    let mut values = Map::new();
    for (name, field_kind) in columns(kind) {
        let neutral = match field_kind {
            FieldKind::Integer => Value::from(0),
            FieldKind::Number => Value::from(0.0),
            FieldKind::Text => Value::from(""),
            FieldKind::Boolean => Value::from(false),
        };
        values.insert(name, neutral);
    }
    values.insert("id".to_string(), Value::from(id));
    if let Value::Object(extra) = extra {
        values.extend(extra);
    }
    Value::Object(values)
}

/// Lines of an artifact file, CSV header included
pub fn artifact_lines(artifact: &ExportArtifact) -> Vec<String> {
    std::fs::read_to_string(&artifact.path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// `(id, crud)` of every line of a JSON artifact
pub fn json_entries(artifact: &ExportArtifact) -> Vec<(i64, String)> {
    artifact_lines(artifact)
        .iter()
        .map(|line| {
            let value: Value = serde_json::from_str(line).unwrap();
            (
                value["id"].as_i64().unwrap(),
                value["crud"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}
