pub mod datetime;

pub use datetime::coerce_datetime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Destination database family of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dialect {
    MySql,
    Sqlite,
    Postgres,
    MsSql,
    #[default]
    Other,
}

impl Dialect {
    /// Resolve a driver client name (`mysql2`, `pg`, `sqlite3`, ...)
    pub fn from_client(client: &str) -> Self {
        match client.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mysql2" | "mariadb" => Dialect::MySql,
            "sqlite" | "sqlite3" | "better-sqlite3" => Dialect::Sqlite,
            "pg" | "postgres" | "postgresql" => Dialect::Postgres,
            "mssql" | "sqlserver" | "tedious" => Dialect::MsSql,
            _ => Dialect::Other,
        }
    }
}

/// A value ready for the physical write path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    /// Bound as a plain parameter
    Value(Value),
    /// Raw SQL fragment with `?` placeholders and their bindings
    Raw { sql: String, bindings: Vec<Value> },
}

impl StoredValue {
    pub fn raw(sql: &str, bindings: Vec<Value>) -> Self {
        StoredValue::Raw {
            sql: sql.to_string(),
            bindings,
        }
    }

    /// The plain value, if this is not a raw expression
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            StoredValue::Value(value) => Some(value),
            StoredValue::Raw { .. } => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, StoredValue::Raw { .. })
    }
}

impl From<Value> for StoredValue {
    fn from(value: Value) -> Self {
        StoredValue::Value(value)
    }
}

/// Make a user-chosen physical column name safe to use as a query key.
///
/// Control characters are dropped and unescaped `?` runs are escaped so a
/// name can never be read as a binding placeholder.
pub fn sanitize_identifier(name: &str) -> Cow<'_, str> {
    if !name.chars().any(|c| c == '?' || c.is_control()) {
        return Cow::Borrowed(name);
    }

    let mut out = String::with_capacity(name.len() + 2);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c.is_control() {
            continue;
        }
        if c == '?' && prev != Some('?') && prev != Some('\\') {
            out.push('\\');
        }
        out.push(c);
        prev = Some(c);
    }
    Cow::Owned(out)
}
