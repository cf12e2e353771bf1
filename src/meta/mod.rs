pub mod audit;
pub mod column;
pub mod context;
pub mod contracts;
pub mod model;
pub mod view;

pub use audit::MetaAudit;
pub use column::{Column, ColumnKind, ColumnOptionsTarget, ColumnSpec, MetaColumns};
pub use context::MetaContext;
pub use contracts::{AuditService, ColumnService, ViewService};
pub use model::{Model, ModelInfo, ModelLookup, ModelSpec, ModelType, WriteRow};
pub use view::{MetaViews, View, ViewColumn, ViewKind, ViewSpec};

use crate::core::{MetaError, Record, Result};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// Stable sort by a nullable `order`; rows without one go last.
pub(crate) fn sort_by_order<T>(items: &mut [T], order: impl Fn(&T) -> Option<i64>) {
    items.sort_by(|a, b| match (order(a), order(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

pub(crate) fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        Value::Object(record) => Ok(record),
        other => Err(MetaError::Serialization(format!(
            "expected an object record, got {}",
            other
        ))),
    }
}

pub(crate) fn patch(fields: impl IntoIterator<Item = (&'static str, Value)>) -> Record {
    fields
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}
