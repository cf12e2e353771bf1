//! Table metadata: the `Model` entity and its cached read/write paths.
//!
//! Reads go cache first and fall back to the store, repopulating the cache
//! on the way out. Narrow updates patch the cached snapshot in place, then
//! write the store. Deletion is a re-runnable cascade over views, columns
//! and their options.

mod alias_map;
mod delete_cascade;
mod read_paths;
mod write_paths;

pub use alias_map::WriteRow;

use super::column::{Column, ColumnSpec};
use super::to_record;
use super::view::View;
use crate::cache::{CacheItem, CacheScope};
use crate::core::{MetaError, MetaTable, Record, Result, ScopeIds};
use crate::storage::Filter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Table,
    View,
}

fn default_true() -> bool {
    true
}

/// A table definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub base_id: Option<String>,
    /// Physical name
    pub table_name: String,
    /// Alias shown to users
    pub title: String,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(rename = "type", default)]
    pub kind: ModelType,
    /// Many-to-many junction table
    #[serde(default)]
    pub mm: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default = "default_true")]
    pub exportable: bool,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Turn a serialized `meta` blob into structured JSON in place
fn parse_meta_blob(meta: &mut Option<Value>) -> Result<()> {
    if let Some(Value::String(blob)) = meta {
        *meta = if blob.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(blob)?)
        };
    }
    Ok(())
}

impl Model {
    /// Build from a store row. A malformed `meta` blob is an error here.
    pub fn from_record(mut record: Record) -> Result<Self> {
        let mut meta = record.remove("meta").filter(|m| !m.is_null());
        parse_meta_blob(&mut meta)?;
        if let Some(meta) = meta {
            record.insert("meta".to_string(), meta);
        }
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    /// Store row for this model; `meta` is written as a serialized blob
    pub fn to_record(&self) -> Result<Record> {
        let mut record = to_record(self)?;
        let blob = match &self.meta {
            Some(meta) => Value::String(serde_json::to_string(meta)?),
            None => Value::Null,
        };
        record.insert("meta".to_string(), blob);
        Ok(record)
    }

    /// Parse a `meta` still held as text (e.g. written by another process)
    pub fn normalize_meta(&mut self) -> Result<()> {
        parse_meta_blob(&mut self.meta)
    }

    pub fn scope(&self) -> ScopeIds {
        ScopeIds {
            project_id: self.project_id.clone(),
            base_id: self.base_id.clone(),
        }
    }

    pub(crate) fn cache_key(ctx: &super::MetaContext, id: &str) -> String {
        ctx.cache.key(CacheScope::Model, id)
    }
}

impl CacheItem for Model {
    fn cache_id(&self) -> &str {
        &self.id
    }
}

/// Store filter selecting the models of a scope
pub(crate) fn scope_filter(scope: &ScopeIds) -> Filter {
    let filter = Filter::new().eq("project_id", scope.project_id.as_str());
    match &scope.base_id {
        Some(base_id) => filter.eq("base_id", base_id.as_str()),
        None => filter,
    }
}

/// How a model is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLookup {
    Id(String),
    TableName { scope: ScopeIds, table_name: String },
}

impl ModelLookup {
    pub fn id(id: &str) -> Self {
        ModelLookup::Id(id.to_string())
    }

    pub fn table_name(scope: &ScopeIds, table_name: &str) -> Self {
        ModelLookup::TableName {
            scope: scope.clone(),
            table_name: table_name.to_string(),
        }
    }
}

/// Validated description of a model to create
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSpec {
    pub table_name: String,
    pub title: Option<String>,
    pub order: Option<i64>,
    pub kind: ModelType,
    pub mm: bool,
    pub meta: Option<Value>,
    pub columns: Vec<ColumnSpec>,
}

impl ModelSpec {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn kind(mut self, kind: ModelType) -> Self {
        self.kind = kind;
        self
    }

    pub fn mm(mut self, mm: bool) -> Self {
        self.mm = mm;
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Require a physical name, default the title, and leave exactly one
    /// primary-value column when any column qualifies.
    pub fn validate(mut self) -> Result<Self> {
        if self.table_name.trim().is_empty() {
            return Err(MetaError::bad_request("Missing 'table_name' property in body"));
        }
        if self.title.as_deref().is_none_or(|t| t.trim().is_empty()) {
            self.title = Some(self.table_name.clone());
        }

        let flagged = self.columns.iter().position(|c| c.pv);
        let target = flagged.or_else(|| {
            self.columns
                .iter()
                .position(|c| !c.pk && !c.kind.is_virtual())
        });
        for (index, column) in self.columns.iter_mut().enumerate() {
            column.pv = Some(index) == target;
        }

        Ok(self)
    }

    pub(crate) fn into_model(self, id: String, scope: &ScopeIds, order: i64) -> Model {
        Model {
            id,
            project_id: scope.project_id.clone(),
            base_id: scope.base_id.clone(),
            title: self.title.unwrap_or_else(|| self.table_name.clone()),
            table_name: self.table_name,
            order: Some(order),
            kind: self.kind,
            mm: self.mm,
            enabled: true,
            deleted: false,
            exportable: true,
            meta: self.meta,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Immutable hydrated snapshot of a model with its columns and views
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub model: Model,
    pub columns: Vec<Column>,
    pub views: Vec<View>,
    columns_by_id: HashMap<String, usize>,
}

impl ModelInfo {
    pub fn new(model: Model, columns: Vec<Column>, views: Vec<View>) -> Self {
        let columns_by_id = columns
            .iter()
            .enumerate()
            .map(|(index, column)| (column.id.clone(), index))
            .collect();
        Self {
            model,
            columns,
            views,
            columns_by_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.model.id
    }

    /// O(1) column lookup by id
    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns_by_id.get(id).map(|&index| &self.columns[index])
    }

    pub fn primary_value_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.pv)
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.pk)
    }

    pub fn default_view(&self) -> Option<&View> {
        self.views.iter().find(|v| v.is_default)
    }
}

pub(crate) const MODELS: MetaTable = MetaTable::Models;
