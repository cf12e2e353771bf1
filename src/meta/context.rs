use super::audit::MetaAudit;
use super::column::MetaColumns;
use super::contracts::{AuditService, ColumnService, ViewService};
use super::view::MetaViews;
use crate::cache::Cache;
use crate::config::MetaConfig;
use crate::core::Result;
use crate::storage::{InMemoryMetaStore, MetadataStore};
use std::sync::Arc;

/// Everything a metadata operation needs, passed explicitly to each call.
///
/// Cloning is cheap: all members are shared handles.
#[derive(Clone)]
pub struct MetaContext {
    pub store: Arc<dyn MetadataStore>,
    pub cache: Cache,
    pub columns: Arc<dyn ColumnService>,
    pub views: Arc<dyn ViewService>,
    pub audit: Arc<dyn AuditService>,
}

impl MetaContext {
    /// Context with the store-backed column, view and audit services
    pub fn new(store: Arc<dyn MetadataStore>, cache: Cache) -> Self {
        Self {
            store,
            cache,
            columns: Arc::new(MetaColumns),
            views: Arc::new(MetaViews),
            audit: Arc::new(MetaAudit),
        }
    }

    /// Validate `config` and build an LRU-cached context over `store`
    pub fn from_config(store: Arc<dyn MetadataStore>, config: &MetaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(store, Cache::from_config(config)))
    }

    /// Context over a fresh in-memory store with default configuration
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryMetaStore::new()),
            Cache::from_config(&MetaConfig::default()),
        )
    }

    pub fn with_columns(mut self, columns: Arc<dyn ColumnService>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_views(mut self, views: Arc<dyn ViewService>) -> Self {
        self.views = views;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditService>) -> Self {
        self.audit = audit;
        self
    }
}
