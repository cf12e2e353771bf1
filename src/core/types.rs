use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A persisted metadata row, keyed by column name.
pub type Record = Map<String, Value>;

/// Physical tables owned by the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaTable {
    Models,
    Columns,
    Views,
    GridViewColumns,
    ColRollup,
    ColLookup,
    ColRelations,
    ColSelectOptions,
    ColFormula,
    Comments,
}

impl MetaTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaTable::Models => "nc_models",
            MetaTable::Columns => "nc_columns",
            MetaTable::Views => "nc_views",
            MetaTable::GridViewColumns => "nc_grid_view_columns",
            MetaTable::ColRollup => "nc_col_rollup",
            MetaTable::ColLookup => "nc_col_lookup",
            MetaTable::ColRelations => "nc_col_relations",
            MetaTable::ColSelectOptions => "nc_col_select_options",
            MetaTable::ColFormula => "nc_col_formula",
            MetaTable::Comments => "nc_comments",
        }
    }

    /// Prefix of ids generated for rows of this table.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            MetaTable::Models => "md",
            MetaTable::Columns => "cl",
            MetaTable::Views => "vw",
            MetaTable::GridViewColumns => "nc",
            MetaTable::ColRollup => "rl",
            MetaTable::ColLookup => "lk",
            MetaTable::ColRelations => "ln",
            MetaTable::ColSelectOptions => "sl",
            MetaTable::ColFormula => "fm",
            MetaTable::Comments => "cm",
        }
    }
}

impl fmt::Display for MetaTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh row id for `table`, e.g. `md_3f2a…`.
pub fn generate_id(table: MetaTable) -> String {
    format!("{}_{}", table.id_prefix(), uuid::Uuid::new_v4().simple())
}

/// Project (and optionally base) a metadata object lives under.
///
/// Model lists are cached under both `(project, base)` and `(project)` so
/// lookups succeed with or without base context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeIds {
    pub project_id: String,
    pub base_id: Option<String>,
}

impl ScopeIds {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            base_id: None,
        }
    }

    pub fn new(project_id: impl Into<String>, base_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            base_id: Some(base_id.into()),
        }
    }

    /// Cache sub-keys for this scope: `[project]` or `[project, base]`.
    pub fn sub_keys(&self) -> Vec<&str> {
        match &self.base_id {
            Some(base) => vec![self.project_id.as_str(), base.as_str()],
            None => vec![self.project_id.as_str()],
        }
    }
}

pub(crate) fn record_str<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}
