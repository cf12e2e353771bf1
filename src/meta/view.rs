use super::column::Column;
use super::context::MetaContext;
use super::contracts::ViewService;
use super::{patch, sort_by_order, to_record};
use crate::cache::{CacheDelDirection, CacheItem, CacheScope};
use crate::core::{MetaError, MetaTable, Record, Result, generate_id};
use crate::storage::{Filter, OrderBy};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    #[default]
    Grid,
    Form,
    Gallery,
    Kanban,
}

/// A presentation of a model's columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    pub fk_model_id: String,
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: ViewKind,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub order: Option<i64>,
    /// Shortcut to the model's primary-value column
    #[serde(default)]
    pub pv_column_id: Option<String>,
}

impl View {
    pub fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }
}

impl CacheItem for View {
    fn cache_id(&self) -> &str {
        &self.id
    }
}

/// Placement of one column inside a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewColumn {
    pub id: String,
    pub fk_view_id: String,
    pub fk_column_id: String,
    #[serde(default)]
    pub show: bool,
    #[serde(default)]
    pub order: Option<i64>,
}

impl ViewColumn {
    pub fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }
}

impl CacheItem for ViewColumn {
    fn cache_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewSpec {
    pub fk_model_id: String,
    pub title: String,
    pub kind: ViewKind,
    pub is_default: bool,
}

impl ViewSpec {
    pub fn new(fk_model_id: &str, title: &str, kind: ViewKind) -> Self {
        Self {
            fk_model_id: fk_model_id.to_string(),
            title: title.to_string(),
            kind,
            is_default: false,
        }
    }

    /// The grid view every model starts with
    pub fn default_grid(fk_model_id: &str, title: &str) -> Self {
        Self {
            is_default: true,
            ..Self::new(fk_model_id, title, ViewKind::Grid)
        }
    }
}

/// View service backed by the context's store and cache
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaViews;

impl MetaViews {
    async fn insert_view_column(
        ctx: &MetaContext,
        view_id: &str,
        column: &Column,
        order: i64,
    ) -> Result<ViewColumn> {
        let view_column = ViewColumn {
            id: generate_id(MetaTable::GridViewColumns),
            fk_view_id: view_id.to_string(),
            fk_column_id: column.id.clone(),
            show: !column.system,
            order: Some(order),
        };
        ctx.store
            .insert(MetaTable::GridViewColumns, to_record(&view_column)?)
            .await?;

        let key = ctx.cache.key(CacheScope::GridViewColumn, &view_column.id);
        ctx.cache.set(&key, &view_column).await?;
        ctx.cache
            .append_to_list(CacheScope::GridViewColumn, &[view_id], &key)
            .await?;
        Ok(view_column)
    }

    /// Patch the cached view (best effort), then the store
    async fn update_view(
        ctx: &MetaContext,
        view_id: &str,
        fields: Record,
        apply: impl FnOnce(&mut View),
    ) -> Result<()> {
        let key = ctx.cache.key(CacheScope::View, view_id);
        match ctx.cache.get::<View>(&key).await {
            Ok(Some(mut view)) => {
                apply(&mut view);
                ctx.cache.set(&key, &view).await?;
            }
            Ok(None) => {}
            Err(MetaError::Serialization(err)) => {
                debug!("skipping cache patch of '{}': {}", key, err);
            }
            Err(err) => return Err(err),
        }

        if let Err(err) = ctx.store.update(MetaTable::Views, view_id, fields).await {
            let _ = ctx.cache.del(&[key]).await;
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl ViewService for MetaViews {
    async fn insert(&self, ctx: &MetaContext, spec: ViewSpec) -> Result<View> {
        if spec.title.trim().is_empty() {
            return Err(MetaError::bad_request("Missing 'title' property in view"));
        }

        let order = ctx
            .store
            .next_order(
                MetaTable::Views,
                &Filter::new().eq("fk_model_id", spec.fk_model_id.as_str()),
            )
            .await?;

        let columns = ctx.columns.list_by_model(ctx, &spec.fk_model_id).await?;
        let view = View {
            id: generate_id(MetaTable::Views),
            fk_model_id: spec.fk_model_id,
            title: spec.title,
            kind: spec.kind,
            is_default: spec.is_default,
            order: Some(order),
            pv_column_id: columns.iter().find(|c| c.pv).map(|c| c.id.clone()),
        };
        ctx.store
            .insert(MetaTable::Views, to_record(&view)?)
            .await?;

        let key = ctx.cache.key(CacheScope::View, &view.id);
        ctx.cache.set(&key, &view).await?;
        ctx.cache
            .append_to_list(CacheScope::View, &[view.fk_model_id.as_str()], &key)
            .await?;

        for (position, column) in columns.iter().enumerate() {
            Self::insert_view_column(ctx, &view.id, column, position as i64 + 1).await?;
        }

        Ok(view)
    }

    async fn get(&self, ctx: &MetaContext, view_id: &str) -> Result<Option<View>> {
        let key = ctx.cache.key(CacheScope::View, view_id);
        if let Some(view) = ctx.cache.get::<View>(&key).await? {
            return Ok(Some(view));
        }

        let Some(record) = ctx.store.get(MetaTable::Views, view_id).await? else {
            return Ok(None);
        };
        let view = View::from_record(record)?;
        ctx.cache.set(&key, &view).await?;
        Ok(Some(view))
    }

    async fn list_with_info_by_model(&self, ctx: &MetaContext, model_id: &str) -> Result<Vec<View>> {
        let cached = ctx
            .cache
            .get_list::<View>(CacheScope::View, &[model_id])
            .await?;

        let mut views = if cached.is_cached() {
            cached.items
        } else {
            let rows = ctx
                .store
                .list(
                    MetaTable::Views,
                    &Filter::new().eq("fk_model_id", model_id),
                    Some(&OrderBy::asc("order")),
                )
                .await?;
            let views = rows
                .into_iter()
                .map(View::from_record)
                .collect::<Result<Vec<_>>>()?;
            ctx.cache
                .set_list(CacheScope::View, &[model_id], &views)
                .await?;
            views
        };

        sort_by_order(&mut views, |v| v.order);
        Ok(views)
    }

    async fn get_default_view_by_model(
        &self,
        ctx: &MetaContext,
        model_id: &str,
    ) -> Result<Option<View>> {
        let views = self.list_with_info_by_model(ctx, model_id).await?;
        Ok(views.into_iter().find(|v| v.is_default))
    }

    async fn columns(&self, ctx: &MetaContext, view_id: &str) -> Result<Vec<ViewColumn>> {
        let cached = ctx
            .cache
            .get_list::<ViewColumn>(CacheScope::GridViewColumn, &[view_id])
            .await?;

        let mut columns = if cached.is_cached() {
            cached.items
        } else {
            let rows = ctx
                .store
                .list(
                    MetaTable::GridViewColumns,
                    &Filter::new().eq("fk_view_id", view_id),
                    Some(&OrderBy::asc("order")),
                )
                .await?;
            let columns = rows
                .into_iter()
                .map(ViewColumn::from_record)
                .collect::<Result<Vec<_>>>()?;
            ctx.cache
                .set_list(CacheScope::GridViewColumn, &[view_id], &columns)
                .await?;
            columns
        };

        sort_by_order(&mut columns, |c| c.order);
        Ok(columns)
    }

    async fn add_column(&self, ctx: &MetaContext, model_id: &str, column: &Column) -> Result<()> {
        for view in self.list_with_info_by_model(ctx, model_id).await? {
            let existing = self.columns(ctx, &view.id).await?;
            if existing.iter().any(|vc| vc.fk_column_id == column.id) {
                continue;
            }
            let order = existing.iter().filter_map(|vc| vc.order).max().unwrap_or(0) + 1;
            Self::insert_view_column(ctx, &view.id, column, order).await?;
        }
        Ok(())
    }

    async fn fix_primary_column_shortcut(&self, ctx: &MetaContext, view_id: &str) -> Result<bool> {
        let Some(view) = self.get(ctx, view_id).await? else {
            return Ok(false);
        };

        let model_columns = ctx.columns.list_by_model(ctx, &view.fk_model_id).await?;
        let Some(pv) = model_columns.iter().find(|c| c.pv) else {
            return Ok(false);
        };

        if view.pv_column_id.as_deref() != Some(pv.id.as_str()) {
            let pv_id = pv.id.clone();
            Self::update_view(
                ctx,
                view_id,
                patch([("pv_column_id", Value::from(pv_id.as_str()))]),
                |v| v.pv_column_id = Some(pv_id.clone()),
            )
            .await?;
        }

        // The display column is always visible and leads the view
        let view_columns = self.columns(ctx, view_id).await?;
        let lead = view_columns
            .iter()
            .filter(|vc| vc.fk_column_id != pv.id)
            .filter_map(|vc| vc.order)
            .min();

        match view_columns.iter().find(|vc| vc.fk_column_id == pv.id) {
            Some(vc) => {
                let order = match (lead, vc.order) {
                    (Some(lead), Some(own)) if own < lead => own,
                    (Some(lead), _) => lead - 1,
                    (None, own) => own.unwrap_or(1),
                };
                if vc.show && vc.order == Some(order) {
                    return Ok(true);
                }

                ctx.store
                    .update(
                        MetaTable::GridViewColumns,
                        &vc.id,
                        patch([("show", Value::Bool(true)), ("order", Value::from(order))]),
                    )
                    .await?;
                let list_key = ctx.cache.list_key(CacheScope::GridViewColumn, &[view_id]);
                ctx.cache
                    .deep_del(&list_key, CacheDelDirection::ParentToChild)
                    .await?;
            }
            None => {
                Self::insert_view_column(ctx, view_id, pv, lead.map_or(1, |lead| lead - 1))
                    .await?;
            }
        }

        Ok(true)
    }

    async fn delete(&self, ctx: &MetaContext, view_id: &str) -> Result<()> {
        ctx.store
            .delete_where(
                MetaTable::GridViewColumns,
                &Filter::new().eq("fk_view_id", view_id),
            )
            .await?;
        let list_key = ctx.cache.list_key(CacheScope::GridViewColumn, &[view_id]);
        ctx.cache
            .deep_del(&list_key, CacheDelDirection::ParentToChild)
            .await?;

        let key = ctx.cache.key(CacheScope::View, view_id);
        ctx.cache
            .deep_del(&key, CacheDelDirection::ChildToParent)
            .await?;
        ctx.store.delete(MetaTable::Views, view_id).await?;
        Ok(())
    }
}
