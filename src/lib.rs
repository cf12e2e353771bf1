// ============================================================================
// Metacache Library
// ============================================================================

//! Read-through metadata cache for user-defined tables, columns and views.
//!
//! The [`MetadataStore`] is authoritative. The [`Cache`] keeps snapshots of
//! frequently read schema objects and list memberships in front of it, and
//! every mutation in [`meta`] keeps the two coherent.
//!
//! # Examples
//!
//! ```
//! use metacache::{ColumnKind, ColumnSpec, MetaContext, Model, ModelSpec, ScopeIds};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = MetaContext::in_memory();
//! let scope = ScopeIds::new("p1", "b1");
//!
//! let orders = Model::insert(
//!     &ctx,
//!     &scope,
//!     ModelSpec::new("orders")
//!         .title("Orders")
//!         .column(ColumnSpec::new("id", ColumnKind::Id).primary_key())
//!         .column(ColumnSpec::new("name", ColumnKind::SingleLineText)),
//! )
//! .await?;
//!
//! assert!(orders.default_view().is_some());
//! assert_eq!(Model::list(&ctx, &scope).await?.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod dialect;
pub mod handle;
pub mod meta;
pub mod prelude;
pub mod storage;

// Re-export main types for convenience
pub use cache::{Cache, CacheBackend, CacheDelDirection, CacheScope, LruCacheBackend};
pub use config::MetaConfig;
pub use core::{MetaError, MetaTable, Record, Result, ScopeIds};
pub use dialect::{Dialect, StoredValue};
pub use handle::ModelQueryHandle;
pub use meta::{
    AuditService, Column, ColumnKind, ColumnService, ColumnSpec, MetaContext, Model, ModelInfo,
    ModelLookup, ModelSpec, ModelType, View, ViewKind, ViewService, ViewSpec, WriteRow,
};
pub use storage::{Filter, InMemoryMetaStore, MetadataStore, OrderBy};
