use super::{MODELS, Model, ModelInfo, ModelLookup, scope_filter};
use crate::cache::CacheScope;
use crate::cache::pattern::escape_glob;
use crate::core::{MetaError, Result, ScopeIds};
use crate::meta::context::MetaContext;
use crate::meta::sort_by_order;
use crate::storage::OrderBy;
use futures::future::try_join_all;
use log::{debug, warn};
use serde::de::DeserializeOwned;

/// Cache read where an undecodable entry counts as a miss.
///
/// The store is authoritative, so a snapshot we can no longer decode is
/// dropped and re-read rather than failing the lookup.
pub(super) async fn read_cached<T: DeserializeOwned>(ctx: &MetaContext, key: &str) -> Result<Option<T>> {
    match ctx.cache.get::<T>(key).await {
        Err(MetaError::Serialization(err)) => {
            warn!("dropping undecodable cache entry '{}': {}", key, err);
            ctx.cache.del(&[key.to_string()]).await?;
            Ok(None)
        }
        other => other,
    }
}

/// List scopes a model is registered under: `(project, base)` and `(project)`
pub(super) fn list_scopes(scope: &ScopeIds) -> Vec<Vec<&str>> {
    match &scope.base_id {
        Some(base_id) => vec![
            vec![scope.project_id.as_str(), base_id.as_str()],
            vec![scope.project_id.as_str()],
        ],
        None => vec![vec![scope.project_id.as_str()]],
    }
}

fn alias_id(scope: &ScopeIds, alias_or_id: &str) -> String {
    match &scope.base_id {
        Some(base_id) => format!("{}:{}:{}", scope.project_id, base_id, alias_or_id),
        None => format!("{}:{}", scope.project_id, alias_or_id),
    }
}

/// Drop alias indirections for `names` under every base of `project_id`
pub(super) async fn evict_aliases(ctx: &MetaContext, project_id: &str, names: &[&str]) -> Result<()> {
    let project = escape_glob(project_id);
    for name in names.iter().filter(|n| !n.is_empty()) {
        let name = escape_glob(name);
        ctx.cache
            .del_all(CacheScope::ModelAlias, &format!("{}:{}", project, name))
            .await?;
        ctx.cache
            .del_all(CacheScope::ModelAlias, &format!("{}:*:{}", project, name))
            .await?;
    }
    Ok(())
}

impl Model {
    /// Point lookup by id
    pub async fn get(ctx: &MetaContext, id: &str) -> Result<Option<Model>> {
        let key = Model::cache_key(ctx, id);
        if let Some(model) = read_cached::<Model>(ctx, &key).await? {
            return Ok(Some(model));
        }

        debug!("model cache miss for '{}'", id);
        let Some(record) = ctx.store.get(MODELS, id).await? else {
            return Ok(None);
        };
        let model = Model::from_record(record)?;
        ctx.cache.set(&key, &model).await?;
        Ok(Some(model))
    }

    pub async fn get_by_id_or_name(ctx: &MetaContext, lookup: &ModelLookup) -> Result<Option<Model>> {
        let (scope, table_name) = match lookup {
            ModelLookup::Id(id) => return Model::get(ctx, id).await,
            ModelLookup::TableName { scope, table_name } => (scope, table_name),
        };

        let filter = scope_filter(scope).eq("table_name", table_name.as_str());
        let Some(record) = ctx.store.find_one(MODELS, &filter).await? else {
            return Ok(None);
        };
        let model = Model::from_record(record)?;
        ctx.cache
            .set(&Model::cache_key(ctx, &model.id), &model)
            .await?;
        Ok(Some(model))
    }

    /// Resolve a title, physical name or id within `scope`.
    ///
    /// The resolved id is cached under the given string, and the model itself
    /// is then read through its id key.
    pub async fn get_by_alias_or_id(
        ctx: &MetaContext,
        scope: &ScopeIds,
        alias_or_id: &str,
    ) -> Result<Option<Model>> {
        let alias_key = ctx.cache.key(CacheScope::ModelAlias, &alias_id(scope, alias_or_id));

        if let Some(id) = read_cached::<String>(ctx, &alias_key).await? {
            match Model::get(ctx, &id).await? {
                Some(model) => return Ok(Some(model)),
                None => {
                    debug!("alias '{}' points at missing model '{}'", alias_key, id);
                    ctx.cache.del(&[alias_key.clone()]).await?;
                }
            }
        }

        let filter = scope_filter(scope)
            .or_eq("id", alias_or_id)
            .or_eq("title", alias_or_id)
            .or_eq("table_name", alias_or_id);
        let Some(record) = ctx.store.find_one(MODELS, &filter).await? else {
            return Ok(None);
        };
        let model = Model::from_record(record)?;

        ctx.cache.set(&alias_key, &model.id).await?;
        ctx.cache
            .set(&Model::cache_key(ctx, &model.id), &model)
            .await?;
        Ok(Some(model))
    }

    /// Model plus fresh column and view snapshots
    pub async fn get_with_info(ctx: &MetaContext, lookup: &ModelLookup) -> Result<Option<ModelInfo>> {
        match Model::get_by_id_or_name(ctx, lookup).await? {
            Some(model) => Ok(Some(model.hydrate(ctx).await?)),
            None => Ok(None),
        }
    }

    /// Models of a scope, ascending by `order` with unordered models last
    pub async fn list(ctx: &MetaContext, scope: &ScopeIds) -> Result<Vec<Model>> {
        let sub_keys = scope.sub_keys();
        let cached = match ctx.cache.get_list::<Model>(CacheScope::Model, &sub_keys).await {
            Ok(cached) if cached.is_cached() => Some(cached.items),
            Ok(_) => None,
            Err(MetaError::Serialization(err)) => {
                warn!("dropping undecodable model list for {:?}: {}", sub_keys, err);
                None
            }
            Err(err) => return Err(err),
        };

        let mut models = match cached {
            Some(models) => models,
            None => {
                let rows = ctx
                    .store
                    .list(MODELS, &scope_filter(scope), Some(&OrderBy::asc("order")))
                    .await?;
                let models = rows
                    .into_iter()
                    .map(Model::from_record)
                    .collect::<Result<Vec<_>>>()?;
                ctx.cache
                    .set_list(CacheScope::Model, &sub_keys, &models)
                    .await?;
                models
            }
        };

        sort_by_order(&mut models, |m| m.order);
        Ok(models)
    }

    pub async fn list_with_info(ctx: &MetaContext, scope: &ScopeIds) -> Result<Vec<ModelInfo>> {
        let models = Model::list(ctx, scope).await?;
        try_join_all(models.into_iter().map(|model| model.hydrate(ctx))).await
    }

    /// Load this model's columns and views into a new snapshot
    pub async fn hydrate(self, ctx: &MetaContext) -> Result<ModelInfo> {
        let (columns, views) = futures::try_join!(
            ctx.columns.list_by_model(ctx, &self.id),
            ctx.views.list_with_info_by_model(ctx, &self.id),
        )?;
        Ok(ModelInfo::new(self, columns, views))
    }
}
