//! Handle passed to the query executor that runs data queries against a
//! user table.

use crate::core::{MetaError, Record, Result};
use crate::dialect::Dialect;
use crate::meta::{MetaContext, Model, ModelInfo, ModelLookup, WriteRow};
use std::sync::Arc;

/// A storage driver bound to one hydrated model and one of its views
#[derive(Debug, Clone)]
pub struct ModelQueryHandle<D> {
    pub driver: D,
    pub view_id: String,
    pub model: Arc<ModelInfo>,
    pub dialect: Dialect,
}

impl<D> ModelQueryHandle<D> {
    /// Hydrate `model_id` and pick `view_id`, or the model's default view.
    pub async fn resolve(
        ctx: &MetaContext,
        driver: D,
        dialect: Dialect,
        model_id: &str,
        view_id: Option<&str>,
    ) -> Result<Self> {
        let model = Model::get_with_info(ctx, &ModelLookup::id(model_id))
            .await?
            .ok_or_else(|| MetaError::NotFound("Model", model_id.to_string()))?;

        let view_id = match view_id {
            Some(view_id) => {
                let view = ctx
                    .views
                    .get(ctx, view_id)
                    .await?
                    .ok_or_else(|| MetaError::NotFound("View", view_id.to_string()))?;
                if view.fk_model_id != model.id() {
                    return Err(MetaError::bad_request(format!(
                        "View '{}' does not belong to model '{}'",
                        view_id, model_id
                    )));
                }
                view.id
            }
            None => model
                .default_view()
                .map(|view| view.id.clone())
                .ok_or_else(|| MetaError::NotFound("Default view", model_id.to_string()))?,
        };

        Ok(Self {
            driver,
            view_id,
            model: Arc::new(model),
            dialect,
        })
    }

    pub fn map_alias_to_column(&self, row: &Record) -> Result<WriteRow> {
        self.model.map_alias_to_column(row, self.dialect)
    }

    pub fn map_column_to_alias(&self, row: &Record) -> Record {
        self.model.map_column_to_alias(row)
    }
}
