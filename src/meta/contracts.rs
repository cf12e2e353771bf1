//! Collaborator contracts the model layer calls into.
//!
//! Column, view and audit logic live behind these traits so the model
//! cascade only depends on the operations it actually uses. Store-backed
//! implementations are [`MetaColumns`](super::MetaColumns),
//! [`MetaViews`](super::MetaViews) and [`MetaAudit`](super::MetaAudit).

use super::column::{Column, ColumnSpec};
use super::context::MetaContext;
use super::view::{View, ViewColumn, ViewSpec};
use crate::core::{Record, Result};
use async_trait::async_trait;

#[async_trait]
pub trait ColumnService: Send + Sync {
    /// Columns of a model, ascending by `order`
    async fn list_by_model(&self, ctx: &MetaContext, model_id: &str) -> Result<Vec<Column>>;

    async fn get(&self, ctx: &MetaContext, column_id: &str) -> Result<Option<Column>>;

    /// Persist a column (and its kind-specific options) and attach it to
    /// every view of the model
    async fn insert(&self, ctx: &MetaContext, model_id: &str, spec: ColumnSpec) -> Result<Column>;

    /// Evict the model's column cache and delete all of its column rows
    async fn clear_list_by_model(&self, ctx: &MetaContext, model_id: &str) -> Result<()>;

    /// Side-table option rows of an extended column kind
    async fn options(&self, ctx: &MetaContext, column: &Column) -> Result<Vec<Record>>;
}

#[async_trait]
pub trait ViewService: Send + Sync {
    async fn insert(&self, ctx: &MetaContext, spec: ViewSpec) -> Result<View>;

    async fn get(&self, ctx: &MetaContext, view_id: &str) -> Result<Option<View>>;

    /// Views of a model, ascending by `order`
    async fn list_with_info_by_model(&self, ctx: &MetaContext, model_id: &str) -> Result<Vec<View>>;

    async fn get_default_view_by_model(
        &self,
        ctx: &MetaContext,
        model_id: &str,
    ) -> Result<Option<View>>;

    /// Column rows of a view, ascending by `order`
    async fn columns(&self, ctx: &MetaContext, view_id: &str) -> Result<Vec<ViewColumn>>;

    /// Add `column` to every view of `model_id`
    async fn add_column(&self, ctx: &MetaContext, model_id: &str, column: &Column) -> Result<()>;

    /// Re-point the view's primary-value shortcut at the model's current
    /// primary-value column. Returns false when there was nothing to fix.
    async fn fix_primary_column_shortcut(&self, ctx: &MetaContext, view_id: &str) -> Result<bool>;

    async fn delete(&self, ctx: &MetaContext, view_id: &str) -> Result<()>;
}

#[async_trait]
pub trait AuditService: Send + Sync {
    /// Remove row comments attached to a model. Returns how many were removed.
    async fn delete_row_comments_by_model(&self, ctx: &MetaContext, model_id: &str) -> Result<u64>;
}
