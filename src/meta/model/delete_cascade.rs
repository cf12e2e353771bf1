use super::read_paths::evict_aliases;
use super::{MODELS, Model};
use crate::cache::pattern::escape_glob;
use crate::cache::{CacheDelDirection, CacheScope};
use crate::core::types::record_str;
use crate::core::{MetaTable, Result};
use crate::meta::context::MetaContext;
use crate::storage::Filter;
use tracing::{Instrument, Level, event, info_span};

impl Model {
    /// Delete the model with everything it owns.
    ///
    /// There is no rollback. Each step only removes what is still present,
    /// so re-running after a failure finishes the job. With `force`,
    /// relations in other models that target this one are removed too.
    pub async fn delete(&self, ctx: &MetaContext, force: bool) -> Result<bool> {
        let span = info_span!(
            "meta.model.delete",
            model_id = %self.id,
            table_name = %self.table_name,
            force = force
        );

        async move {
            ctx.audit.delete_row_comments_by_model(ctx, &self.id).await?;

            let views = ctx.views.list_with_info_by_model(ctx, &self.id).await?;
            for view in &views {
                ctx.views.delete(ctx, &view.id).await?;
            }
            let view_list = ctx.cache.list_key(CacheScope::View, &[self.id.as_str()]);
            ctx.cache
                .deep_del(&view_list, CacheDelDirection::ParentToChild)
                .await?;
            event!(Level::DEBUG, views = views.len(), "views deleted");

            let columns = ctx.columns.list_by_model(ctx, &self.id).await?;
            for column in &columns {
                let Some(target) = column.kind.options_target() else {
                    continue;
                };
                ctx.store
                    .delete_where(
                        target.table,
                        &Filter::new().eq("fk_column_id", column.id.as_str()),
                    )
                    .await?;
                ctx.cache
                    .deep_del(
                        &ctx.cache.key(target.scope, &column.id),
                        CacheDelDirection::ChildToParent,
                    )
                    .await?;
                ctx.cache
                    .deep_del(
                        &ctx.cache.key(CacheScope::Column, &column.id),
                        CacheDelDirection::ChildToParent,
                    )
                    .await?;
            }

            if force {
                self.delete_inbound_relations(ctx).await?;
            }

            ctx.columns.clear_list_by_model(ctx, &self.id).await?;
            event!(Level::DEBUG, columns = columns.len(), "columns deleted");

            // If the store delete fails the cached lists already miss this
            // model while its row remains; re-running the delete reconciles them.
            ctx.cache
                .deep_del(
                    &Model::cache_key(ctx, &self.id),
                    CacheDelDirection::ChildToParent,
                )
                .await?;
            ctx.store.delete(MODELS, &self.id).await?;

            evict_aliases(
                ctx,
                &self.project_id,
                &[
                    self.id.as_str(),
                    self.title.as_str(),
                    self.table_name.as_str(),
                ],
            )
            .await?;

            event!(Level::DEBUG, "model deleted");
            Ok(true)
        }
        .instrument(span)
        .await
    }

    /// Remove relation rows of other models that point at this one
    async fn delete_inbound_relations(&self, ctx: &MetaContext) -> Result<()> {
        let inbound = Filter::new().eq("fk_related_model_id", self.id.as_str());
        let relations = ctx
            .store
            .list(MetaTable::ColRelations, &inbound, None)
            .await?;

        for relation in &relations {
            let Some(column_id) = record_str(relation, "fk_column_id") else {
                continue;
            };
            ctx.cache
                .deep_del(
                    &ctx.cache.key(CacheScope::ColRelation, column_id),
                    CacheDelDirection::ChildToParent,
                )
                .await?;

            // The owning model's column list goes with the column so it is
            // never served without it
            if let Some(column) = ctx.columns.get(ctx, column_id).await? {
                let list_key = ctx
                    .cache
                    .list_key(CacheScope::Column, &[column.fk_model_id.as_str()]);
                ctx.cache
                    .deep_del(&list_key, CacheDelDirection::ParentToChild)
                    .await?;
            }
            ctx.cache
                .deep_del(
                    &ctx.cache.key(CacheScope::Column, column_id),
                    CacheDelDirection::ChildToParent,
                )
                .await?;
        }

        let removed = ctx
            .store
            .delete_where(MetaTable::ColRelations, &inbound)
            .await?;
        event!(Level::DEBUG, removed = removed, "inbound relations deleted");
        Ok(())
    }

    /// Delete by id. Returns false when no such model exists.
    pub async fn delete_by_id(ctx: &MetaContext, model_id: &str, force: bool) -> Result<bool> {
        match Model::get(ctx, model_id).await? {
            Some(model) => model.delete(ctx, force).await,
            None => {
                // A previous run may have stopped after the row was gone
                ctx.cache
                    .del_all(
                        CacheScope::ModelAlias,
                        &format!("*:{}", escape_glob(model_id)),
                    )
                    .await?;
                Ok(false)
            }
        }
    }
}
