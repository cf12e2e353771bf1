use super::read_paths::{evict_aliases, list_scopes};
use super::{MODELS, Model, ModelInfo, ModelLookup, ModelSpec, scope_filter};
use crate::cache::CacheScope;
use crate::core::{MetaError, Record, Result, ScopeIds, generate_id};
use crate::meta::column::set_primary_value_flag;
use crate::meta::context::MetaContext;
use crate::meta::patch;
use crate::meta::view::ViewSpec;
use log::debug;
use serde_json::Value;
use tracing::{Instrument, Level, event, info_span};

impl Model {
    /// Create a model with its default grid view and inline columns.
    ///
    /// Nothing touches the cache until the row is persisted.
    pub async fn insert(ctx: &MetaContext, scope: &ScopeIds, spec: ModelSpec) -> Result<ModelInfo> {
        let mut spec = spec.validate()?;

        let order = match spec.order {
            Some(order) => order,
            None => ctx.store.next_order(MODELS, &scope_filter(scope)).await?,
        };
        let columns = std::mem::take(&mut spec.columns);
        let model = spec.into_model(generate_id(MODELS), scope, order);
        let id = ctx.store.insert(MODELS, model.to_record()?).await?;

        // Read back so the cached object carries the store's timestamps
        let model = Model::get(ctx, &id)
            .await?
            .ok_or_else(|| MetaError::NotFound("Model", id.clone()))?;
        let key = Model::cache_key(ctx, &id);
        for sub_keys in list_scopes(scope) {
            ctx.cache
                .append_to_list(CacheScope::Model, &sub_keys, &key)
                .await?;
        }

        let view = ctx
            .views
            .insert(ctx, ViewSpec::default_grid(&id, &model.title))
            .await?;
        for column in columns {
            ctx.columns.insert(ctx, &id, column).await?;
        }
        ctx.views.fix_primary_column_shortcut(ctx, &view.id).await?;

        Model::get_with_info(ctx, &ModelLookup::Id(id.clone()))
            .await?
            .ok_or_else(|| MetaError::NotFound("Model", id))
    }

    /// Patch the cached model in place (best effort), then write `fields` to
    /// the store. Returns false when the model row does not exist.
    async fn update_fields(
        ctx: &MetaContext,
        model_id: &str,
        fields: Record,
        apply: impl FnOnce(&mut Model),
    ) -> Result<bool> {
        let key = Model::cache_key(ctx, model_id);
        match ctx.cache.get::<Model>(&key).await {
            Ok(Some(mut model)) => {
                apply(&mut model);
                if let Err(err) = model.normalize_meta() {
                    debug!("keeping unparsed meta of cached model '{}': {}", model_id, err);
                }
                ctx.cache.set(&key, &model).await?;
            }
            Ok(None) => {}
            Err(MetaError::Serialization(err)) => {
                debug!("skipping cache patch of '{}': {}", key, err);
            }
            Err(err) => return Err(err),
        }

        match ctx.store.update(MODELS, model_id, fields).await {
            Ok(0) => {
                ctx.cache.del(&[key]).await?;
                Ok(false)
            }
            Ok(_) => Ok(true),
            Err(err) => {
                let _ = ctx.cache.del(&[key]).await;
                Err(err)
            }
        }
    }

    /// Rename a model: new alias and physical name
    pub async fn update_alias_and_table_name(
        ctx: &MetaContext,
        model_id: &str,
        title: &str,
        table_name: &str,
    ) -> Result<bool> {
        if title.trim().is_empty() {
            return Err(MetaError::bad_request("Missing 'title' property in body"));
        }
        if table_name.trim().is_empty() {
            return Err(MetaError::bad_request("Missing 'table_name' property in body"));
        }

        let Some(current) = Model::get(ctx, model_id).await? else {
            return Ok(false);
        };

        let updated = Model::update_fields(
            ctx,
            model_id,
            patch([
                ("title", Value::from(title)),
                ("table_name", Value::from(table_name)),
            ]),
            |model| {
                model.title = title.to_string();
                model.table_name = table_name.to_string();
            },
        )
        .await?;

        evict_aliases(
            ctx,
            &current.project_id,
            &[
                model_id,
                current.title.as_str(),
                current.table_name.as_str(),
                title,
                table_name,
            ],
        )
        .await?;
        Ok(updated)
    }

    pub async fn update_order(ctx: &MetaContext, model_id: &str, order: i64) -> Result<bool> {
        Model::update_fields(
            ctx,
            model_id,
            patch([("order", Value::from(order))]),
            |model| model.order = Some(order),
        )
        .await
    }

    /// Mark a model as a many-to-many junction table
    pub async fn set_as_mm(ctx: &MetaContext, model_id: &str) -> Result<bool> {
        Model::update_fields(
            ctx,
            model_id,
            patch([("mm", Value::Bool(true))]),
            |model| model.mm = true,
        )
        .await
    }

    pub async fn set_enabled(ctx: &MetaContext, model_id: &str, enabled: bool) -> Result<bool> {
        Model::update_fields(
            ctx,
            model_id,
            patch([("enabled", Value::Bool(enabled))]),
            |model| model.enabled = enabled,
        )
        .await
    }

    /// Replace the model's `meta` blob
    pub async fn update_meta(ctx: &MetaContext, model_id: &str, meta: Value) -> Result<bool> {
        let blob = match &meta {
            Value::Null => Value::Null,
            other => Value::String(serde_json::to_string(other)?),
        };
        let meta = (!meta.is_null()).then_some(meta);

        Model::update_fields(ctx, model_id, patch([("meta", blob)]), |model| {
            model.meta = meta
        })
        .await
    }

    /// Make `column_id` the model's only primary-value column.
    ///
    /// Existing flags are cleared before the target is set, then view
    /// shortcuts still pointing elsewhere are refreshed.
    pub async fn update_primary_column(
        ctx: &MetaContext,
        model_id: &str,
        column_id: &str,
    ) -> Result<bool> {
        let span = info_span!(
            "meta.model.update_primary_column",
            model_id = %model_id,
            column_id = %column_id
        );

        async move {
            let columns = ctx.columns.list_by_model(ctx, model_id).await?;
            let Some(target) = columns.iter().find(|c| c.id == column_id) else {
                return Err(MetaError::bad_request(format!(
                    "Column '{}' not found in model '{}'",
                    column_id, model_id
                )));
            };

            for column in columns.iter().filter(|c| c.pv && c.id != column_id) {
                set_primary_value_flag(ctx, &column.id, false).await?;
                event!(Level::DEBUG, cleared = %column.id, "primary value flag cleared");
            }
            if !target.pv {
                set_primary_value_flag(ctx, column_id, true).await?;
            }

            let views = ctx.views.list_with_info_by_model(ctx, model_id).await?;
            for view in views
                .iter()
                .filter(|v| v.pv_column_id.as_deref() != Some(column_id))
            {
                ctx.views.fix_primary_column_shortcut(ctx, &view.id).await?;
            }

            event!(Level::DEBUG, "primary value column switched");
            Ok(true)
        }
        .instrument(span)
        .await
    }
}
