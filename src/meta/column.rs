use super::context::MetaContext;
use super::contracts::ColumnService;
use super::{patch, sort_by_order, to_record};
use crate::cache::{CacheDelDirection, CacheItem, CacheScope};
use crate::core::{MetaError, MetaTable, Record, Result, generate_id};
use crate::storage::{Filter, OrderBy};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// User-facing column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    #[serde(rename = "ID")]
    Id,
    SingleLineText,
    LongText,
    Number,
    Decimal,
    Checkbox,
    Date,
    DateTime,
    #[serde(rename = "JSON")]
    Json,
    Attachment,
    SingleSelect,
    MultiSelect,
    ForeignKey,
    LinkToAnotherRecord,
    Lookup,
    Rollup,
    Formula,
}

/// Where an extended column kind keeps its options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnOptionsTarget {
    pub table: MetaTable,
    pub scope: CacheScope,
}

/// One entry per kind that owns a side-options table.
const COLUMN_OPTION_TABLES: &[(ColumnKind, MetaTable, CacheScope)] = &[
    (ColumnKind::Rollup, MetaTable::ColRollup, CacheScope::ColRollup),
    (ColumnKind::Lookup, MetaTable::ColLookup, CacheScope::ColLookup),
    (ColumnKind::ForeignKey, MetaTable::ColRelations, CacheScope::ColRelation),
    (ColumnKind::LinkToAnotherRecord, MetaTable::ColRelations, CacheScope::ColRelation),
    (ColumnKind::SingleSelect, MetaTable::ColSelectOptions, CacheScope::ColSelectOption),
    (ColumnKind::MultiSelect, MetaTable::ColSelectOptions, CacheScope::ColSelectOption),
    (ColumnKind::Formula, MetaTable::ColFormula, CacheScope::ColFormula),
];

impl ColumnKind {
    /// Computed columns with no physical storage
    pub fn is_virtual(&self) -> bool {
        matches!(
            self,
            ColumnKind::LinkToAnotherRecord
                | ColumnKind::Lookup
                | ColumnKind::Rollup
                | ColumnKind::Formula
        )
    }

    pub fn options_target(&self) -> Option<ColumnOptionsTarget> {
        COLUMN_OPTION_TABLES
            .iter()
            .find(|(kind, _, _)| kind == self)
            .map(|&(_, table, scope)| ColumnOptionsTarget { table, scope })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub fk_model_id: String,
    pub column_name: String,
    pub title: String,
    #[serde(rename = "uidt")]
    pub kind: ColumnKind,
    /// Primary key
    #[serde(default)]
    pub pk: bool,
    /// Primary (display) value
    #[serde(default)]
    pub pv: bool,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub order: Option<i64>,
}

impl Column {
    pub fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    pub fn is_virtual(&self) -> bool {
        self.kind.is_virtual()
    }
}

impl CacheItem for Column {
    fn cache_id(&self) -> &str {
        &self.id
    }
}

/// Validated description of a column to create
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub column_name: String,
    pub title: Option<String>,
    pub kind: ColumnKind,
    pub pk: bool,
    pub pv: bool,
    pub system: bool,
    pub order: Option<i64>,
    /// Kind-specific options: one object, or an array of rows (select options)
    pub options: Option<Value>,
}

impl ColumnSpec {
    pub fn new(column_name: &str, kind: ColumnKind) -> Self {
        Self {
            column_name: column_name.to_string(),
            title: None,
            kind,
            pk: false,
            pv: false,
            system: false,
            order: None,
            options: None,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.pk = true;
        self
    }

    pub fn primary_value(mut self) -> Self {
        self.pv = true;
        self
    }

    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Title falls back to the physical name, and virtual columns may be
    /// given a title only.
    pub(crate) fn validated(mut self) -> Result<Self> {
        let title = self.title.take().filter(|t| !t.trim().is_empty());

        if self.column_name.trim().is_empty() {
            match (&title, self.kind.is_virtual()) {
                (Some(title), true) => self.column_name = title.clone(),
                _ => {
                    return Err(MetaError::bad_request(
                        "Missing 'column_name' property in column",
                    ));
                }
            }
        }

        self.title = Some(title.unwrap_or_else(|| self.column_name.clone()));
        Ok(self)
    }
}

/// Flip a column's primary-value flag: patch the cached copy if any, then
/// the store.
pub(crate) async fn set_primary_value_flag(
    ctx: &MetaContext,
    column_id: &str,
    pv: bool,
) -> Result<()> {
    let key = ctx.cache.key(CacheScope::Column, column_id);
    match ctx.cache.get::<Column>(&key).await {
        Ok(Some(mut column)) => {
            column.pv = pv;
            ctx.cache.set(&key, &column).await?;
        }
        Ok(None) => {}
        Err(MetaError::Serialization(err)) => {
            debug!("skipping cache patch of '{}': {}", key, err);
        }
        Err(err) => return Err(err),
    }

    if let Err(err) = ctx
        .store
        .update(MetaTable::Columns, column_id, patch([("pv", Value::Bool(pv))]))
        .await
    {
        let _ = ctx.cache.del(&[key]).await;
        return Err(err);
    }
    Ok(())
}

/// Column service backed by the context's store and cache
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaColumns;

impl MetaColumns {
    async fn insert_options(
        ctx: &MetaContext,
        target: ColumnOptionsTarget,
        column_id: &str,
        options: Value,
    ) -> Result<()> {
        let rows = match options {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        for (index, row) in rows.into_iter().enumerate() {
            let Value::Object(mut record) = row else {
                return Err(MetaError::bad_request(format!(
                    "Column options for '{}' must be objects",
                    column_id
                )));
            };
            record.insert("fk_column_id".to_string(), Value::from(column_id));
            if target.table == MetaTable::ColSelectOptions && !record.contains_key("order") {
                record.insert("order".to_string(), Value::from(index as i64 + 1));
            }
            ctx.store.insert(target.table, record).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl ColumnService for MetaColumns {
    async fn list_by_model(&self, ctx: &MetaContext, model_id: &str) -> Result<Vec<Column>> {
        let cached = ctx
            .cache
            .get_list::<Column>(CacheScope::Column, &[model_id])
            .await?;

        let mut columns = if cached.is_cached() {
            cached.items
        } else {
            let rows = ctx
                .store
                .list(
                    MetaTable::Columns,
                    &Filter::new().eq("fk_model_id", model_id),
                    Some(&OrderBy::asc("order")),
                )
                .await?;
            let columns = rows
                .into_iter()
                .map(Column::from_record)
                .collect::<Result<Vec<_>>>()?;
            ctx.cache
                .set_list(CacheScope::Column, &[model_id], &columns)
                .await?;
            columns
        };

        sort_by_order(&mut columns, |c| c.order);
        Ok(columns)
    }

    async fn get(&self, ctx: &MetaContext, column_id: &str) -> Result<Option<Column>> {
        let key = ctx.cache.key(CacheScope::Column, column_id);
        if let Some(column) = ctx.cache.get::<Column>(&key).await? {
            return Ok(Some(column));
        }

        let Some(record) = ctx.store.get(MetaTable::Columns, column_id).await? else {
            return Ok(None);
        };
        let column = Column::from_record(record)?;
        ctx.cache.set(&key, &column).await?;
        Ok(Some(column))
    }

    async fn insert(&self, ctx: &MetaContext, model_id: &str, spec: ColumnSpec) -> Result<Column> {
        let spec = spec.validated()?;

        let order = match spec.order {
            Some(order) => order,
            None => {
                ctx.store
                    .next_order(
                        MetaTable::Columns,
                        &Filter::new().eq("fk_model_id", model_id),
                    )
                    .await?
            }
        };

        let column = Column {
            id: generate_id(MetaTable::Columns),
            fk_model_id: model_id.to_string(),
            title: spec.title.clone().unwrap_or_else(|| spec.column_name.clone()),
            column_name: spec.column_name,
            kind: spec.kind,
            pk: spec.pk,
            pv: spec.pv,
            system: spec.system,
            order: Some(order),
        };
        ctx.store
            .insert(MetaTable::Columns, to_record(&column)?)
            .await?;

        if let (Some(target), Some(options)) = (column.kind.options_target(), spec.options) {
            Self::insert_options(ctx, target, &column.id, options).await?;
        }

        let key = ctx.cache.key(CacheScope::Column, &column.id);
        ctx.cache.set(&key, &column).await?;
        ctx.cache
            .append_to_list(CacheScope::Column, &[model_id], &key)
            .await?;

        ctx.views.add_column(ctx, model_id, &column).await?;
        Ok(column)
    }

    async fn clear_list_by_model(&self, ctx: &MetaContext, model_id: &str) -> Result<()> {
        let by_model = Filter::new().eq("fk_model_id", model_id);

        // Columns may be cached individually without being in the list
        let rows = ctx.store.list(MetaTable::Columns, &by_model, None).await?;
        let keys: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_str))
            .map(|id| ctx.cache.key(CacheScope::Column, id))
            .collect();

        let list_key = ctx.cache.list_key(CacheScope::Column, &[model_id]);
        ctx.cache
            .deep_del(&list_key, CacheDelDirection::ParentToChild)
            .await?;
        ctx.cache.del(&keys).await?;

        ctx.store.delete_where(MetaTable::Columns, &by_model).await?;
        Ok(())
    }

    async fn options(&self, ctx: &MetaContext, column: &Column) -> Result<Vec<Record>> {
        let Some(target) = column.kind.options_target() else {
            return Ok(Vec::new());
        };

        let key = ctx.cache.key(target.scope, &column.id);
        if let Some(rows) = ctx.cache.get::<Vec<Record>>(&key).await? {
            return Ok(rows);
        }

        let rows = ctx
            .store
            .list(
                target.table,
                &Filter::new().eq("fk_column_id", column.id.as_str()),
                Some(&OrderBy::asc("order")),
            )
            .await?;
        ctx.cache.set(&key, &rows).await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_table_covers_extended_kinds() {
        let relation = ColumnKind::LinkToAnotherRecord.options_target().unwrap();
        assert_eq!(relation.table, MetaTable::ColRelations);
        assert_eq!(relation.scope, CacheScope::ColRelation);
        assert_eq!(
            ColumnKind::ForeignKey.options_target(),
            Some(relation)
        );
        assert_eq!(
            ColumnKind::MultiSelect.options_target().unwrap().table,
            MetaTable::ColSelectOptions
        );
        assert!(ColumnKind::SingleLineText.options_target().is_none());
        assert!(ColumnKind::DateTime.options_target().is_none());
    }

    #[test]
    fn test_kind_serializes_as_ui_type_name() {
        assert_eq!(serde_json::to_value(ColumnKind::Id).unwrap(), "ID");
        assert_eq!(serde_json::to_value(ColumnKind::DateTime).unwrap(), "DateTime");
    }

    #[test]
    fn test_spec_validation() {
        let spec = ColumnSpec::new("name", ColumnKind::SingleLineText)
            .validated()
            .unwrap();
        assert_eq!(spec.title.as_deref(), Some("name"));

        let virtual_col = ColumnSpec::new("", ColumnKind::Formula)
            .title("Total")
            .validated()
            .unwrap();
        assert_eq!(virtual_col.column_name, "Total");

        let err = ColumnSpec::new(" ", ColumnKind::Number).validated().unwrap_err();
        assert!(err.is_bad_request());
    }
}
