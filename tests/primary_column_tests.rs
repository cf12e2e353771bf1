use anyhow::Result;
use metacache::core::MetaTable;
use metacache::storage::Filter;
use metacache::{
    Cache, ColumnKind, ColumnSpec, InMemoryMetaStore, MetaConfig, MetaContext, MetadataStore,
    Model, ModelInfo, ModelSpec, Record, ScopeIds,
};
use serde_json::{Value, json};
use std::sync::Arc;

fn context(store: &Arc<InMemoryMetaStore>) -> MetaContext {
    MetaContext::new(store.clone(), Cache::from_config(&MetaConfig::default()))
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

fn column_id(info: &ModelInfo, name: &str) -> String {
    info.columns
        .iter()
        .find(|c| c.column_name == name)
        .map(|c| c.id.clone())
        .unwrap_or_default()
}

async fn notes_model(ctx: &MetaContext) -> Result<ModelInfo> {
    let spec = ModelSpec::new("notes")
        .column(ColumnSpec::new("id", ColumnKind::Id).primary_key())
        .column(ColumnSpec::new("title", ColumnKind::SingleLineText))
        .column(ColumnSpec::new("body", ColumnKind::LongText));
    Ok(Model::insert(ctx, &ScopeIds::new("p1", "b1"), spec).await?)
}

/// Ids of the columns flagged primary-value in the store
async fn stored_primary_values(store: &InMemoryMetaStore, model_id: &str) -> Result<Vec<String>> {
    let rows = store
        .list(
            MetaTable::Columns,
            &Filter::new().eq("fk_model_id", model_id).eq("pv", true),
            None,
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

#[tokio::test]
async fn test_insert_defaults_primary_value_to_first_plain_column() -> Result<()> {
    let store = Arc::new(InMemoryMetaStore::new());
    let ctx = context(&store);

    let info = notes_model(&ctx).await?;
    let pv = info.primary_value_column().expect("a primary value column");
    assert_eq!(pv.column_name, "title");
    assert_eq!(stored_primary_values(&store, info.id()).await?, [pv.id.clone()]);

    let view = info.default_view().expect("default view");
    assert_eq!(view.pv_column_id.as_deref(), Some(pv.id.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_insert_keeps_first_flagged_primary_value() -> Result<()> {
    let store = Arc::new(InMemoryMetaStore::new());
    let ctx = context(&store);

    let spec = ModelSpec::new("tags")
        .column(ColumnSpec::new("label", ColumnKind::SingleLineText))
        .column(ColumnSpec::new("slug", ColumnKind::SingleLineText).primary_value())
        .column(ColumnSpec::new("color", ColumnKind::SingleLineText).primary_value());
    let info = Model::insert(&ctx, &ScopeIds::new("p1", "b1"), spec).await?;

    let flagged: Vec<&str> = info
        .columns
        .iter()
        .filter(|c| c.pv)
        .map(|c| c.column_name.as_str())
        .collect();
    assert_eq!(flagged, ["slug"]);
    Ok(())
}

#[tokio::test]
async fn test_legacy_double_primary_value_is_repaired() -> Result<()> {
    let store = Arc::new(InMemoryMetaStore::new());
    let info = notes_model(&context(&store)).await?;
    let title = column_id(&info, "title");
    let body = column_id(&info, "body");

    // Two flagged columns written behind the cache's back
    store
        .update(MetaTable::Columns, &body, record(json!({"pv": true})))
        .await?;
    let ctx = context(&store);
    let before = ctx.columns.list_by_model(&ctx, info.id()).await?;
    assert_eq!(before.iter().filter(|c| c.pv).count(), 2);

    assert!(Model::update_primary_column(&ctx, info.id(), &body).await?);

    assert_eq!(stored_primary_values(&store, info.id()).await?, [body.clone()]);
    let after = ctx.columns.list_by_model(&ctx, info.id()).await?;
    let flagged: Vec<&str> = after.iter().filter(|c| c.pv).map(|c| c.id.as_str()).collect();
    assert_eq!(flagged, [body.as_str()]);
    assert!(after.iter().any(|c| c.id == title && !c.pv));
    Ok(())
}

#[tokio::test]
async fn test_switch_refreshes_view_shortcut() -> Result<()> {
    let store = Arc::new(InMemoryMetaStore::new());
    let ctx = context(&store);
    let info = notes_model(&ctx).await?;
    let body = column_id(&info, "body");

    Model::update_primary_column(&ctx, info.id(), &body).await?;

    let view = ctx
        .views
        .get_default_view_by_model(&ctx, info.id())
        .await?
        .expect("default view");
    assert_eq!(view.pv_column_id.as_deref(), Some(body.as_str()));

    let view_columns = ctx.views.columns(&ctx, &view.id).await?;
    let lead = &view_columns[0];
    assert_eq!(lead.fk_column_id, body);
    assert!(lead.show);

    let hydrated = Model::get_with_info(&ctx, &metacache::ModelLookup::id(info.id()))
        .await?
        .expect("model");
    assert_eq!(hydrated.primary_value_column().map(|c| c.id.as_str()), Some(body.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_switch_from_no_primary_value() -> Result<()> {
    let store = Arc::new(InMemoryMetaStore::new());
    let ctx = context(&store);
    let info = Model::insert(
        &ctx,
        &ScopeIds::new("p1", "b1"),
        ModelSpec::new("tokens").column(ColumnSpec::new("id", ColumnKind::Id).primary_key()),
    )
    .await?;
    let label = ctx
        .columns
        .insert(
            &ctx,
            info.id(),
            ColumnSpec::new("label", ColumnKind::SingleLineText),
        )
        .await?;
    assert!(stored_primary_values(&store, info.id()).await?.is_empty());

    assert!(Model::update_primary_column(&ctx, info.id(), &label.id).await?);

    assert_eq!(stored_primary_values(&store, info.id()).await?, [label.id.clone()]);
    let view = ctx
        .views
        .get_default_view_by_model(&ctx, info.id())
        .await?
        .expect("default view");
    assert_eq!(view.pv_column_id.as_deref(), Some(label.id.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_foreign_column_is_rejected_without_changes() -> Result<()> {
    let store = Arc::new(InMemoryMetaStore::new());
    let ctx = context(&store);
    let notes = notes_model(&ctx).await?;
    let other = Model::insert(
        &ctx,
        &ScopeIds::new("p1", "b1"),
        ModelSpec::new("labels").column(ColumnSpec::new("name", ColumnKind::SingleLineText)),
    )
    .await?;
    let foreign = column_id(&other, "name");

    let err = Model::update_primary_column(&ctx, notes.id(), &foreign)
        .await
        .unwrap_err();
    assert!(err.is_bad_request());

    assert_eq!(
        stored_primary_values(&store, notes.id()).await?,
        [column_id(&notes, "title")]
    );
    assert_eq!(stored_primary_values(&store, other.id()).await?, [foreign]);
    Ok(())
}
