//! Recommended imports grouped by how deep an embedder goes.
//!
//! `app` covers reading and mutating models. `integration` adds the seams
//! used to plug in a real store, cache backend or collaborator services.

pub mod app {
    //! Everyday model operations over an existing [`MetaContext`].
    pub use crate::{
        ColumnKind, ColumnSpec, Dialect, MetaContext, MetaError, Model, ModelInfo, ModelLookup,
        ModelQueryHandle, ModelSpec, ModelType, Result, ScopeIds,
    };
}

pub mod integration {
    //! Traits and building blocks for wiring a context by hand.
    pub use crate::cache::{CacheBackend, CacheItem, LruCacheBackend};
    pub use crate::meta::{AuditService, ColumnService, MetaAudit, MetaColumns, MetaViews, ViewService};
    pub use crate::storage::{Filter, MetadataStore, OrderBy, SortDirection};
    pub use crate::{Cache, MetaConfig, MetaTable, Record};
}
