//! Translation between user-facing field names and physical column names.

use super::ModelInfo;
use crate::core::{Record, Result};
use crate::dialect::{Dialect, StoredValue, coerce_datetime, sanitize_identifier};
use crate::meta::column::ColumnKind;
use serde_json::Value;
use std::collections::BTreeMap;

/// A row ready for the physical write path, keyed by column name
pub type WriteRow = BTreeMap<String, StoredValue>;

impl ModelInfo {
    /// Physical-column row from one keyed by alias or column name.
    ///
    /// The alias wins when a row carries both. Virtual columns are never
    /// written.
    pub fn map_alias_to_column(&self, row: &Record, dialect: Dialect) -> Result<WriteRow> {
        let mut out = WriteRow::new();

        for column in self.columns.iter().filter(|c| !c.is_virtual()) {
            let Some(value) = row
                .get(&column.title)
                .or_else(|| row.get(&column.column_name))
            else {
                continue;
            };

            let stored = match column.kind {
                ColumnKind::Attachment if !value.is_string() && !value.is_null() => {
                    StoredValue::Value(Value::String(serde_json::to_string(value)?))
                }
                ColumnKind::DateTime => coerce_datetime(value, dialect)?,
                _ => StoredValue::Value(value.clone()),
            };
            out.insert(sanitize_identifier(&column.column_name).into_owned(), stored);
        }

        Ok(out)
    }

    /// Alias-keyed row from a physical one. Unknown keys are dropped.
    pub fn map_column_to_alias(&self, row: &Record) -> Record {
        self.columns
            .iter()
            .filter_map(|column| {
                row.get(&column.column_name)
                    .map(|value| (column.title.clone(), value.clone()))
            })
            .collect()
    }
}
