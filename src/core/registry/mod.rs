//! Datatype registry
//!
//! Assembles the ordered catalogue of exportable datatypes from three layers:
//!
//! 1. **Required** datatypes hard-coded in [`catalogue`]
//! 2. **Logs** datatypes configured in the log configuration table
//! 3. **Optional** datatypes discovered by the [`SchemaIntrospector`]
//!
//! With `apply_config`, each descriptor is reconciled with its persisted
//! [`DatatypeConfig`] override. Missing overrides are created with computed
//! defaults and disabled datatypes are dropped. Assembly is idempotent.

pub mod catalogue;
pub mod config;
pub mod introspect;

pub use catalogue::{required_datatypes, TRACKING_LOG_QUERY};
pub use config::{DatatypeConfig, DatatypeStatus, LogDatatypeDef, DEFAULT_LOG_TABLE};
pub use introspect::{glob_to_regex, SchemaIntrospector, TablePatterns, TIMESTAMP_PREFERENCE};

use crate::adapters::database::traits::{DatatypeConfigStorage, SourceStore};
use crate::config::schema::ExportConfig;
use crate::core::transform::declared_fields;
use crate::domain::{
    DatatypeDescriptor, DatatypeName, FieldKind, HarvestError, Result, StorageKind, TableType,
    TransformKind,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Ordered collection of descriptors
#[derive(Debug, Clone, Default)]
pub struct Datatypes {
    descriptors: Vec<DatatypeDescriptor>,
}

impl Datatypes {
    pub fn new(descriptors: Vec<DatatypeDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn get(&self, name: &DatatypeName) -> Option<&DatatypeDescriptor> {
        self.descriptors.iter().find(|d| &d.name == name)
    }

    pub fn contains(&self, name: &DatatypeName) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DatatypeDescriptor> {
        self.descriptors.iter()
    }

    pub fn names(&self) -> Vec<DatatypeName> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    pub fn first(&self) -> Option<&DatatypeDescriptor> {
        self.descriptors.first()
    }

    /// Datatype following `name` in registry order
    ///
    /// Returns `None` after the last one, or if `name` is unknown.
    pub fn next_after(&self, name: &DatatypeName) -> Option<&DatatypeDescriptor> {
        let position = self.descriptors.iter().position(|d| &d.name == name)?;
        self.descriptors.get(position + 1)
    }

    /// Descriptor whose plain source table is `table`
    pub fn by_table(&self, table: &str) -> Option<&DatatypeDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.source_table() == Some(table))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl IntoIterator for Datatypes {
    type Item = DatatypeDescriptor;
    type IntoIter = std::vec::IntoIter<DatatypeDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.into_iter()
    }
}

impl<'a> IntoIterator for &'a Datatypes {
    type Item = &'a DatatypeDescriptor;
    type IntoIter = std::slice::Iter<'a, DatatypeDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

/// Registry settings taken from the `[export]` section
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    pub excluded_tables: TablePatterns,
    pub disabled_tables: TablePatterns,
    pub default_storage: StorageKind,
}

impl RegistryOptions {
    pub fn from_config(export: &ExportConfig) -> Result<Self> {
        Ok(Self {
            excluded_tables: TablePatterns::new(&export.excluded_tables)?,
            disabled_tables: TablePatterns::new(&export.disabled_tables)?,
            default_storage: export.storage_kind().map_err(HarvestError::Configuration)?,
        })
    }
}

/// Builds the datatype catalogue for a run
pub struct DatatypeRegistry {
    config_store: Arc<dyn DatatypeConfigStorage>,
    introspector: SchemaIntrospector,
    options: RegistryOptions,
}

impl DatatypeRegistry {
    pub fn new(
        source: Arc<dyn SourceStore>,
        config_store: Arc<dyn DatatypeConfigStorage>,
        options: RegistryOptions,
    ) -> Self {
        let introspector = SchemaIntrospector::new(source, options.excluded_tables.clone());
        Self {
            config_store,
            introspector,
            options,
        }
    }

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    /// Ordered map of every datatype
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be introspected or an override
    /// cannot be read or created.
    pub async fn get_datatypes(&self, apply_config: bool) -> Result<Datatypes> {
        let mut descriptors = required_datatypes()?;
        descriptors.extend(self.log_datatypes(&descriptors).await?);
        let optional = self.optional_datatypes(&descriptors).await?;
        descriptors.extend(optional);

        if !apply_config {
            return Ok(Datatypes::new(descriptors));
        }

        let now = chrono::Utc::now().timestamp();
        let mut configured = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if let Some(descriptor) = self.apply_override(descriptor, now).await? {
                configured.push(descriptor);
            }
        }

        tracing::debug!(count = configured.len(), "Datatype registry assembled");
        Ok(Datatypes::new(configured))
    }

    /// A single enabled, configured datatype
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::UnknownDatatype`] if no such datatype exists
    /// and [`HarvestError::DisabledDatatype`] if it is disabled.
    pub async fn resolve(&self, name: &str) -> Result<DatatypeDescriptor> {
        let all = self.get_datatypes(false).await?;
        let descriptor = DatatypeName::new(name)
            .ok()
            .and_then(|name| all.get(&name).cloned())
            .ok_or_else(|| HarvestError::UnknownDatatype(name.to_string()))?;

        let now = chrono::Utc::now().timestamp();
        self.apply_override(descriptor, now)
            .await?
            .ok_or_else(|| HarvestError::DisabledDatatype(name.to_string()))
    }

    async fn log_datatypes(&self, existing: &[DatatypeDescriptor]) -> Result<Vec<DatatypeDescriptor>> {
        let mut descriptors: Vec<DatatypeDescriptor> = Vec::new();

        for def in self.config_store.list_log_datatypes().await? {
            let taken = existing.iter().chain(descriptors.iter()).any(|d| d.name == def.name);
            if taken {
                tracing::warn!(datatype = %def.name, "Log datatype name already in use, skipping");
                continue;
            }

            descriptors.push(
                DatatypeDescriptor::builder(def.name.clone(), TransformKind::LogEvent)
                    .table_type(TableType::Logs)
                    .table(def.log_table.clone())
                    .condition("eventname", def.events.clone())
                    .filter_by_id(true)
                    .fields(declared_fields(TransformKind::LogEvent))
                    .build(),
            );
        }

        Ok(descriptors)
    }

    async fn optional_datatypes(&self, existing: &[DatatypeDescriptor]) -> Result<Vec<DatatypeDescriptor>> {
        let mut claimed: BTreeSet<String> = catalogue::required_tables()
            .into_iter()
            .map(str::to_string)
            .collect();
        claimed.extend(existing.iter().filter_map(|d| d.source_table().map(str::to_string)));

        let mut descriptors = Vec::new();
        for table in self.introspector.list_candidate_tables(&claimed).await? {
            let Ok(name) = DatatypeName::new(table.as_str()) else {
                tracing::debug!(table = %table, "Table name is not a valid datatype name, skipping");
                continue;
            };
            if existing.iter().any(|d| d.name == name) {
                tracing::debug!(table = %table, "Table name collides with a datatype, skipping");
                continue;
            }

            if !self.introspector.integer_column_exists(&table, "id").await? {
                tracing::debug!(table = %table, "Table has no integer id column, skipping");
                continue;
            }

            let builder = DatatypeDescriptor::builder(name, TransformKind::Generic)
                .table_type(TableType::Optional)
                .table(table.clone())
                .fields(self.introspector.describe_fields(&table).await?);

            let descriptor = match self.introspector.find_timestamp_column(&table).await? {
                Some(field) => builder.change_tracking_field(field),
                None => builder.filter_by_id(true).uses_id_diff(true),
            }
            .build();
            descriptors.push(descriptor);
        }

        Ok(descriptors)
    }

    fn default_config(&self, descriptor: &DatatypeDescriptor, now: i64) -> DatatypeConfig {
        let disabled = descriptor
            .source_table()
            .is_some_and(|table| self.options.disabled_tables.matches(table));

        DatatypeConfig {
            datatype: descriptor.name.clone(),
            status: if disabled {
                DatatypeStatus::Disabled
            } else {
                DatatypeStatus::Enabled
            },
            table_type: descriptor.table_type,
            timemodified_field: descriptor.change_tracking_field.clone(),
            filter_by_id: descriptor.filter_by_id,
            rewritable: descriptor.rewritable_on_export,
            storage: self.options.default_storage,
            time_created: now,
            time_modified: now,
        }
    }

    async fn apply_override(
        &self,
        mut descriptor: DatatypeDescriptor,
        now: i64,
    ) -> Result<Option<DatatypeDescriptor>> {
        let config = match self.config_store.load_datatype_config(&descriptor.name).await? {
            Some(config) => config,
            None => {
                let config = self.default_config(&descriptor, now);
                self.config_store.save_datatype_config(&config).await?;
                tracing::info!(
                    datatype = %descriptor.name,
                    status = %config.status,
                    "Created datatype configuration"
                );
                config
            }
        };

        if !config.is_enabled() {
            tracing::debug!(datatype = %descriptor.name, "Datatype disabled");
            return Ok(None);
        }

        descriptor.change_tracking_field = match config.timemodified_field {
            Some(field) if self.timestamp_field_valid(&descriptor, &field).await? => Some(field),
            Some(field) => {
                let reason = match descriptor.source_table() {
                    Some(table) if !self.introspector.column_exists(table, &field).await? => "missing column",
                    _ => "not an integer column",
                };
                tracing::warn!(
                    datatype = %descriptor.name,
                    field = %field,
                    reason,
                    "Configured timestamp field ignored"
                );
                None
            }
            None => None,
        };
        descriptor.filter_by_id = config.filter_by_id;
        descriptor.rewritable_on_export = config.rewritable;
        descriptor.storage = config.storage;

        Ok(Some(descriptor))
    }

    async fn timestamp_field_valid(&self, descriptor: &DatatypeDescriptor, field: &str) -> Result<bool> {
        match descriptor.source_table() {
            Some(table) => self.introspector.integer_column_exists(table, field).await,
            None => Ok(descriptor
                .fields
                .iter()
                .any(|f| f.name == field && f.kind == FieldKind::Integer)),
        }
    }
}
