use super::context::MetaContext;
use super::contracts::AuditService;
use crate::core::{MetaTable, Result};
use crate::storage::Filter;
use async_trait::async_trait;

/// Audit service backed by the context's store
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaAudit;

#[async_trait]
impl AuditService for MetaAudit {
    async fn delete_row_comments_by_model(&self, ctx: &MetaContext, model_id: &str) -> Result<u64> {
        ctx.store
            .delete_where(
                MetaTable::Comments,
                &Filter::new().eq("fk_model_id", model_id),
            )
            .await
    }
}
