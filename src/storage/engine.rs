use crate::core::{MetaTable, Record, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Equality filter over metadata rows.
///
/// All `conditions` must match. When `any_of` is non-empty at least one of
/// its alternatives must match too (e.g. "id = x OR title = x").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<(String, Value)>,
    pub any_of: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((column.to_string(), value.into()));
        self
    }

    /// Add an alternative to the OR group.
    pub fn or_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.any_of.push((column.to_string(), value.into()));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        let field_eq = |(column, value): &(String, Value)| {
            record.get(column).unwrap_or(&Value::Null) == value
        };

        self.conditions.iter().all(field_eq)
            && (self.any_of.is_empty() || self.any_of.iter().any(field_eq))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort key for ordered list fetches. Nulls sort last when ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

/// Authoritative CRUD over metadata rows.
///
/// Implementations wrap whatever actually persists the schema (a SQL meta
/// database, a key-value store, ...). Everything above this trait treats it
/// as the source of truth; the cache is only ever a projection of it.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Point lookup by id.
    async fn get(&self, table: MetaTable, id: &str) -> Result<Option<Record>>;

    /// First row matching `filter`, in retrieval order.
    async fn find_one(&self, table: MetaTable, filter: &Filter) -> Result<Option<Record>>;

    /// All rows matching `filter`, optionally ordered.
    async fn list(
        &self,
        table: MetaTable,
        filter: &Filter,
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<Record>>;

    /// Insert a row, generating an id when the record has none. Returns the id.
    async fn insert(&self, table: MetaTable, record: Record) -> Result<String>;

    /// Merge `patch` into the row with `id`. Returns the number of rows touched.
    async fn update(&self, table: MetaTable, id: &str, patch: Record) -> Result<u64>;

    /// Delete the row with `id`. Deleting a missing row is not an error.
    async fn delete(&self, table: MetaTable, id: &str) -> Result<u64>;

    /// Delete every row matching `filter`.
    async fn delete_where(&self, table: MetaTable, filter: &Filter) -> Result<u64>;

    /// Next free `order` value among rows matching `scope`.
    async fn next_order(&self, table: MetaTable, scope: &Filter) -> Result<i64>;
}
