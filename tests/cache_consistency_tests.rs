use anyhow::Result;
use async_trait::async_trait;
use metacache::core::MetaTable;
use metacache::storage::{Filter, OrderBy};
use metacache::{
    Cache, CacheScope, ColumnKind, ColumnSpec, InMemoryMetaStore, LruCacheBackend, MetaConfig,
    MetaContext, MetaError, MetadataStore, Model, ModelLookup, ModelSpec, Record, ScopeIds,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Store wrapper whose inserts can be switched to fail, and whose next
/// model delete can be made to fail once
struct FlakyStore {
    inner: InMemoryMetaStore,
    fail_inserts: AtomicBool,
    fail_next_model_delete: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryMetaStore::new(),
            fail_inserts: AtomicBool::new(false),
            fail_next_model_delete: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MetadataStore for FlakyStore {
    async fn get(&self, table: MetaTable, id: &str) -> metacache::Result<Option<Record>> {
        self.inner.get(table, id).await
    }

    async fn find_one(&self, table: MetaTable, filter: &Filter) -> metacache::Result<Option<Record>> {
        self.inner.find_one(table, filter).await
    }

    async fn list(
        &self,
        table: MetaTable,
        filter: &Filter,
        order_by: Option<&OrderBy>,
    ) -> metacache::Result<Vec<Record>> {
        self.inner.list(table, filter, order_by).await
    }

    async fn insert(&self, table: MetaTable, record: Record) -> metacache::Result<String> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(MetaError::Store(format!("insert into {} refused", table)));
        }
        self.inner.insert(table, record).await
    }

    async fn update(&self, table: MetaTable, id: &str, patch: Record) -> metacache::Result<u64> {
        self.inner.update(table, id, patch).await
    }

    async fn delete(&self, table: MetaTable, id: &str) -> metacache::Result<u64> {
        if table == MetaTable::Models && self.fail_next_model_delete.swap(false, Ordering::SeqCst) {
            return Err(MetaError::Store(format!("delete of {} refused", id)));
        }
        self.inner.delete(table, id).await
    }

    async fn delete_where(&self, table: MetaTable, filter: &Filter) -> metacache::Result<u64> {
        self.inner.delete_where(table, filter).await
    }

    async fn next_order(&self, table: MetaTable, scope: &Filter) -> metacache::Result<i64> {
        self.inner.next_order(table, scope).await
    }
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

fn context() -> (Arc<InMemoryMetaStore>, MetaContext) {
    let store = Arc::new(InMemoryMetaStore::new());
    let ctx = MetaContext::new(store.clone(), Cache::from_config(&MetaConfig::default()));
    (store, ctx)
}

#[tokio::test]
async fn test_failed_insert_leaves_cache_untouched() -> Result<()> {
    let store = Arc::new(FlakyStore::new());
    let backend = Arc::new(LruCacheBackend::new(1_000));
    let ctx = MetaContext::new(
        store.clone(),
        Cache::new(backend.clone(), &MetaConfig::default()),
    );
    let scope = ScopeIds::new("p1", "b1");

    assert!(Model::list(&ctx, &scope).await?.is_empty());
    let cached_entries = backend.len();

    store.fail_inserts.store(true, Ordering::SeqCst);
    let err = Model::insert(&ctx, &scope, ModelSpec::new("orders"))
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Store(_)));
    assert_eq!(backend.len(), cached_entries);
    assert!(Model::list(&ctx, &scope).await?.is_empty());

    store.fail_inserts.store(false, Ordering::SeqCst);
    Model::insert(&ctx, &scope, ModelSpec::new("orders")).await?;
    assert_eq!(Model::list(&ctx, &scope).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_delete_retry_after_failure_converges() -> Result<()> {
    let store = Arc::new(FlakyStore::new());
    let ctx = MetaContext::new(store.clone(), Cache::from_config(&MetaConfig::default()));
    let scope = ScopeIds::new("p1", "b1");
    let orders = Model::insert(
        &ctx,
        &scope,
        ModelSpec::new("orders").column(ColumnSpec::new("name", ColumnKind::SingleLineText)),
    )
    .await?;
    Model::insert(&ctx, &scope, ModelSpec::new("customers")).await?;
    assert_eq!(Model::list(&ctx, &scope).await?.len(), 2);

    store.fail_next_model_delete.store(true, Ordering::SeqCst);
    let err = Model::delete_by_id(&ctx, orders.id(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Store(_)));
    assert_eq!(store.inner.row_count(MetaTable::Models).await, 2);

    // The earlier steps already ran; the retry finishes the rest
    assert!(Model::delete_by_id(&ctx, orders.id(), false).await?);
    assert!(Model::get(&ctx, orders.id()).await?.is_none());

    let remaining: Vec<String> = Model::list(&ctx, &scope)
        .await?
        .into_iter()
        .map(|m| m.table_name)
        .collect();
    assert_eq!(remaining, ["customers"]);
    assert_eq!(store.inner.row_count(MetaTable::Models).await, 1);
    assert_eq!(store.inner.row_count(MetaTable::Columns).await, 0);
    assert!(!Model::delete_by_id(&ctx, orders.id(), false).await?);
    Ok(())
}

#[tokio::test]
async fn test_reads_are_served_from_cache_after_first_fetch() -> Result<()> {
    let (store, ctx) = context();
    let scope = ScopeIds::new("p1", "b1");
    let orders = Model::insert(&ctx, &scope, ModelSpec::new("orders")).await?;

    // Row removed behind the cache's back: the cached snapshot still answers
    store.delete(MetaTable::Models, orders.id()).await?;
    assert!(Model::get(&ctx, orders.id()).await?.is_some());

    ctx.cache
        .del(&[ctx.cache.key(CacheScope::Model, orders.id())])
        .await?;
    assert!(Model::get(&ctx, orders.id()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_disabled_cache_still_serves_every_operation() -> Result<()> {
    let store = Arc::new(InMemoryMetaStore::new());
    let ctx = MetaContext::from_config(store.clone(), &MetaConfig::new().cache_enabled(false))?;
    let scope = ScopeIds::new("p1", "b1");

    let info = Model::insert(
        &ctx,
        &scope,
        ModelSpec::new("orders").column(ColumnSpec::new("name", ColumnKind::SingleLineText)),
    )
    .await?;
    assert_eq!(info.columns.len(), 1);
    assert!(info.default_view().is_some());

    Model::update_order(&ctx, info.id(), 5).await?;
    assert_eq!(Model::list(&ctx, &scope).await?[0].order, Some(5));

    assert!(Model::delete_by_id(&ctx, info.id(), false).await?);
    assert!(Model::list(&ctx, &scope).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_meta_blob_errors_only_surface_on_cache_miss() -> Result<()> {
    let (store, ctx) = context();
    store
        .insert(
            MetaTable::Models,
            record(json!({
                "id": "md_legacy",
                "project_id": "p1",
                "base_id": "b1",
                "table_name": "legacy",
                "title": "Legacy",
                "order": 1,
                "meta": "{not json",
            })),
        )
        .await?;

    // A snapshot cached by another writer with the blob still unparsed
    let key = ctx.cache.key(CacheScope::Model, "md_legacy");
    ctx.cache
        .set(
            &key,
            &json!({
                "id": "md_legacy",
                "project_id": "p1",
                "base_id": "b1",
                "table_name": "legacy",
                "title": "Legacy",
                "order": 1,
                "meta": "{not json",
            }),
        )
        .await?;

    // Patch path: the unparsable blob is tolerated and the store still updates
    assert!(Model::update_order(&ctx, "md_legacy", 4).await?);
    let row = store.get(MetaTable::Models, "md_legacy").await?.expect("row");
    assert_eq!(row["order"], json!(4));

    let cached = Model::get(&ctx, "md_legacy").await?.expect("cached model");
    assert_eq!(cached.order, Some(4));
    assert_eq!(cached.meta, Some(json!("{not json")));

    // Miss path: the same blob is an error
    ctx.cache.del(&[key]).await?;
    let err = Model::get(&ctx, "md_legacy").await.unwrap_err();
    assert!(matches!(err, MetaError::Serialization(_)));
    Ok(())
}

#[tokio::test]
async fn test_force_delete_removes_inbound_relations() -> Result<()> {
    let (store, ctx) = context();
    let scope = ScopeIds::new("p1", "b1");
    let customers = Model::insert(&ctx, &scope, ModelSpec::new("customers")).await?;
    let invoices = Model::insert(&ctx, &scope, ModelSpec::new("invoices")).await?;
    let orders = Model::insert(&ctx, &scope, ModelSpec::new("orders")).await?;

    for (owner, title) in [(&orders, "Customer"), (&invoices, "Billed To")] {
        ctx.columns
            .insert(
                &ctx,
                owner.id(),
                ColumnSpec::new("", ColumnKind::LinkToAnotherRecord)
                    .title(title)
                    .options(json!({"fk_related_model_id": customers.id(), "type": "bt"})),
            )
            .await?;
    }

    // Warm the orders column list so its eviction is observable
    let before = Model::get_with_info(&ctx, &ModelLookup::id(orders.id()))
        .await?
        .expect("orders");
    let link = before.columns[0].clone();
    assert_eq!(ctx.columns.options(&ctx, &link).await?.len(), 1);

    // Plain delete leaves relations of other models alone
    let invoices_link = Model::get_with_info(&ctx, &ModelLookup::id(invoices.id()))
        .await?
        .expect("invoices")
        .columns[0]
        .clone();
    assert!(
        Model::delete_by_id(&ctx, invoices.id(), false).await?,
        "invoices deleted"
    );
    let inbound = Filter::new().eq("fk_related_model_id", customers.id());
    assert_eq!(store.list(MetaTable::ColRelations, &inbound, None).await?.len(), 1);
    assert!(ctx.columns.get(&ctx, &invoices_link.id).await?.is_none());

    assert!(Model::delete_by_id(&ctx, customers.id(), true).await?);
    assert!(store.list(MetaTable::ColRelations, &inbound, None).await?.is_empty());

    // The column itself survives and is re-read from the store
    let after = Model::get_with_info(&ctx, &ModelLookup::id(orders.id()))
        .await?
        .expect("orders");
    assert_eq!(after.columns.len(), 1);
    assert!(ctx.columns.options(&ctx, &after.columns[0]).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_hydration_returns_independent_snapshots() -> Result<()> {
    let (_, ctx) = context();
    let scope = ScopeIds::new("p1", "b1");
    Model::insert(&ctx, &scope, ModelSpec::new("orders")).await?;
    Model::insert(&ctx, &scope, ModelSpec::new("customers")).await?;

    let (left, right) = tokio::join!(
        Model::list_with_info(&ctx, &scope),
        Model::list_with_info(&ctx, &scope)
    );
    let (mut left, right) = (left?, right?);
    assert_eq!(left, right);

    left[0].model.title = "changed".to_string();
    assert_ne!(left[0].model.title, right[0].model.title);
    assert_eq!(Model::list(&ctx, &scope).await?[0].title, "orders");
    Ok(())
}
