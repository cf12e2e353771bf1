use super::engine::{Filter, MetadataStore, OrderBy, SortDirection};
use crate::core::{MetaError, MetaTable, Record, Result, generate_id};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type TableRows = Arc<RwLock<Vec<Record>>>;

/// Metadata store kept entirely in memory.
///
/// Rows keep insertion order, which is the retrieval order ties fall back
/// to. Used by tests and by embedders that don't need durability.
pub struct InMemoryMetaStore {
    /// Per-table row vectors with individual locks
    tables: RwLock<HashMap<MetaTable, TableRows>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Handle on a table's rows, created on first use
    async fn table(&self, table: MetaTable) -> TableRows {
        if let Some(rows) = self.tables.read().await.get(&table) {
            return Arc::clone(rows);
        }

        let mut tables = self.tables.write().await;
        Arc::clone(tables.entry(table).or_default())
    }

    /// Number of rows currently stored in `table`
    pub async fn row_count(&self, table: MetaTable) -> usize {
        self.table(table).await.read().await.len()
    }
}

impl Default for InMemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

fn row_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Compare two sort keys; `None`/null is greater than any value.
fn compare_keys(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            },
        },
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetaStore {
    async fn get(&self, table: MetaTable, id: &str) -> Result<Option<Record>> {
        let handle = self.table(table).await;
        let rows = handle.read().await;
        Ok(rows.iter().find(|row| row_id(row) == Some(id)).cloned())
    }

    async fn find_one(&self, table: MetaTable, filter: &Filter) -> Result<Option<Record>> {
        let handle = self.table(table).await;
        let rows = handle.read().await;
        Ok(rows.iter().find(|row| filter.matches(row)).cloned())
    }

    async fn list(
        &self,
        table: MetaTable,
        filter: &Filter,
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<Record>> {
        let handle = self.table(table).await;
        let mut matched: Vec<Record> = {
            let rows = handle.read().await;
            rows.iter().filter(|row| filter.matches(row)).cloned().collect()
        };

        if let Some(order) = order_by {
            // sort_by is stable: ties keep insertion order
            matched.sort_by(|a, b| {
                let ord = compare_keys(a.get(&order.column), b.get(&order.column));
                match order.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        Ok(matched)
    }

    async fn insert(&self, table: MetaTable, mut record: Record) -> Result<String> {
        let id = match row_id(&record) {
            Some(id) => id.to_string(),
            None => generate_id(table),
        };

        let now = Value::String(Utc::now().to_rfc3339());
        record.insert("id".to_string(), Value::String(id.clone()));
        if record.get("created_at").is_none_or(Value::is_null) {
            record.insert("created_at".to_string(), now.clone());
        }
        record.insert("updated_at".to_string(), now);

        let handle = self.table(table).await;
        let mut rows = handle.write().await;
        if rows.iter().any(|row| row_id(row) == Some(id.as_str())) {
            return Err(MetaError::Store(format!("duplicate id '{}' in {}", id, table)));
        }
        rows.push(record);
        Ok(id)
    }

    async fn update(&self, table: MetaTable, id: &str, patch: Record) -> Result<u64> {
        let handle = self.table(table).await;
        let mut rows = handle.write().await;

        let Some(row) = rows.iter_mut().find(|row| row_id(row) == Some(id)) else {
            return Ok(0);
        };

        for (column, value) in patch {
            if column != "id" {
                row.insert(column, value);
            }
        }
        row.insert(
            "updated_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        Ok(1)
    }

    async fn delete(&self, table: MetaTable, id: &str) -> Result<u64> {
        let handle = self.table(table).await;
        let mut rows = handle.write().await;
        let before = rows.len();
        rows.retain(|row| row_id(row) != Some(id));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_where(&self, table: MetaTable, filter: &Filter) -> Result<u64> {
        let handle = self.table(table).await;
        let mut rows = handle.write().await;
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok((before - rows.len()) as u64)
    }

    async fn next_order(&self, table: MetaTable, scope: &Filter) -> Result<i64> {
        let handle = self.table(table).await;
        let rows = handle.read().await;
        let max = rows
            .iter()
            .filter(|row| scope.matches(row))
            .filter_map(|row| row.get("order").and_then(Value::as_i64))
            .max();
        Ok(max.map_or(1, |max| max + 1))
    }
}
