use super::{Dialect, StoredValue};
use crate::core::{MetaError, Result};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde_json::Value;

const UTC_SUFFIX: &str = "+00:00";
const UTC_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";
const UTC_NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Text after the date/time separator (`T` or a space), if there is one
fn time_part(text: &str) -> Option<&str> {
    text.find(['T', ' ']).map(|at| &text[at + 1..])
}

/// Whether the text carries a UTC offset after its date part
pub fn has_explicit_offset(text: &str) -> bool {
    let text = text.trim();
    if text.ends_with('Z') || text.ends_with('z') {
        return true;
    }
    time_part(text).is_some_and(|time| time.contains('+') || time.contains('-'))
}

/// Parse a timestamp, reading it as UTC when it has no offset
fn parse_as_utc(text: &str) -> Result<DateTime<Utc>> {
    let mut normalized = text.trim().to_string();

    if time_part(&normalized).is_none() {
        normalized.push_str(" 00:00:00");
    }
    if normalized.ends_with('Z') || normalized.ends_with('z') {
        normalized.pop();
        normalized.push_str(UTC_SUFFIX);
    } else if !has_explicit_offset(&normalized) {
        normalized.push_str(UTC_SUFFIX);
    }

    PARSE_FORMATS
        .iter()
        .find_map(|fmt| DateTime::<FixedOffset>::parse_from_str(&normalized, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| MetaError::TypeMismatch(format!("Invalid datetime value '{}'", text)))
}

/// Normalize a DateTime value for the write path of `dialect`.
///
/// Values without an offset are taken as UTC. The instant never changes;
/// only how it is handed to the database does:
/// - MySQL converts from `+00:00` into the server's global timezone
/// - Postgres shifts into the session timezone
/// - SQL Server switches to the server's current offset
/// - SQLite (and anything unknown) stores plain UTC text
pub fn coerce_datetime(value: &Value, dialect: Dialect) -> Result<StoredValue> {
    let utc = match value {
        Value::String(text) if text.trim().is_empty() => {
            return Ok(StoredValue::Value(value.clone()));
        }
        Value::String(text) => parse_as_utc(text)?,
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| MetaError::TypeMismatch(format!("Invalid epoch timestamp {}", n)))?,
        Value::Null => return Ok(StoredValue::Value(Value::Null)),
        other => {
            return Err(MetaError::TypeMismatch(format!(
                "DateTime expects a string or epoch milliseconds, got {}",
                other
            )));
        }
    };

    let utc_text = utc.format(UTC_TEXT_FORMAT).to_string();

    Ok(match dialect {
        Dialect::MySql => StoredValue::raw(
            "CONVERT_TZ(?, '+00:00', @@GLOBAL.time_zone)",
            vec![Value::String(utc.format(UTC_NAIVE_FORMAT).to_string())],
        ),
        Dialect::Postgres => StoredValue::raw(
            "? AT TIME ZONE CURRENT_SETTING('timezone')",
            vec![Value::String(utc_text)],
        ),
        Dialect::MsSql => StoredValue::raw(
            "SWITCHOFFSET(CONVERT(datetimeoffset, ?), DATENAME(TzOffset, SYSDATETIMEOFFSET()))",
            vec![Value::String(utc_text)],
        ),
        Dialect::Sqlite | Dialect::Other => StoredValue::Value(Value::String(utc_text)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL_DIALECTS: [Dialect; 5] = [
        Dialect::MySql,
        Dialect::Sqlite,
        Dialect::Postgres,
        Dialect::MsSql,
        Dialect::Other,
    ];

    /// The UTC text bound by a coerced value, whatever its wrapping
    fn bound_text(stored: &StoredValue) -> String {
        match stored {
            StoredValue::Value(v) => v.as_str().unwrap().to_string(),
            StoredValue::Raw { bindings, .. } => bindings[0].as_str().unwrap().to_string(),
        }
    }

    #[test]
    fn test_offset_detection() {
        assert!(!has_explicit_offset("2022-01-01 20:00:00"));
        assert!(!has_explicit_offset("2022-01-01T20:00:00.123"));
        assert!(has_explicit_offset("2022-01-01T20:00:00Z"));
        assert!(has_explicit_offset("2022-01-01 20:00:00+08:00"));
        assert!(has_explicit_offset("2022-01-01 20:00:00-05:00"));
        assert!(!has_explicit_offset("2024-3-5 10:00:00"));
        assert!(has_explicit_offset("2024-3-5T10:00:00-05:00"));
    }

    #[test]
    fn test_unpadded_dates_are_read_as_utc() {
        let stored = coerce_datetime(&json!("2024-3-5 10:00:00"), Dialect::Sqlite).unwrap();
        assert_eq!(stored, StoredValue::Value(json!("2024-03-05 10:00:00+00:00")));

        let date_only = coerce_datetime(&json!("2024-3-5"), Dialect::Other).unwrap();
        assert_eq!(date_only, StoredValue::Value(json!("2024-03-05 00:00:00+00:00")));
    }

    #[test]
    fn test_sqlite_formats_plain_utc_text() {
        let stored = coerce_datetime(&json!("2022-01-01 20:00:00"), Dialect::Sqlite).unwrap();
        assert_eq!(stored, StoredValue::Value(json!("2022-01-01 20:00:00+00:00")));

        let shifted = coerce_datetime(&json!("2022-01-01 20:00:00+08:00"), Dialect::Other).unwrap();
        assert_eq!(shifted, StoredValue::Value(json!("2022-01-01 12:00:00+00:00")));
    }

    #[test]
    fn test_mysql_converts_from_utc_offset() {
        let stored = coerce_datetime(&json!("2022-01-01T20:00:00.000Z"), Dialect::MySql).unwrap();
        assert_eq!(
            stored,
            StoredValue::raw(
                "CONVERT_TZ(?, '+00:00', @@GLOBAL.time_zone)",
                vec![json!("2022-01-01 20:00:00")]
            )
        );
    }

    #[test]
    fn test_postgres_and_mssql_wrap_utc_text() {
        let pg = coerce_datetime(&json!("2023-01-01 12:00:00"), Dialect::Postgres).unwrap();
        assert!(pg.is_raw());
        assert_eq!(bound_text(&pg), "2023-01-01 12:00:00+00:00");

        let mssql = coerce_datetime(&json!("2023-05-10T08:49:32Z"), Dialect::MsSql).unwrap();
        match &mssql {
            StoredValue::Raw { sql, .. } => assert!(sql.starts_with("SWITCHOFFSET")),
            other => panic!("expected raw expression, got {:?}", other),
        }
        assert_eq!(bound_text(&mssql), "2023-05-10 08:49:32+00:00");
    }

    #[test]
    fn test_every_dialect_keeps_the_instant() {
        let inputs = [
            "2022-03-04 05:06:07",
            "2022-03-04T05:06:07.250",
            "2022-12-31 23:59:59",
        ];

        for input in inputs {
            let expected = parse_as_utc(&format!("{}Z", input)).unwrap();
            for dialect in ALL_DIALECTS {
                let stored = coerce_datetime(&json!(input), dialect).unwrap();
                let reparsed = parse_as_utc(&bound_text(&stored)).unwrap();
                assert_eq!(reparsed, expected, "dialect {:?} input {}", dialect, input);
            }
        }
    }

    #[test]
    fn test_epoch_millis_and_nulls() {
        let stored = coerce_datetime(&json!(0), Dialect::Sqlite).unwrap();
        assert_eq!(stored, StoredValue::Value(json!("1970-01-01 00:00:00+00:00")));
        assert_eq!(
            coerce_datetime(&Value::Null, Dialect::MySql).unwrap(),
            StoredValue::Value(Value::Null)
        );
        assert!(coerce_datetime(&json!(true), Dialect::Postgres).is_err());
        assert!(coerce_datetime(&json!("not a date"), Dialect::Sqlite).is_err());
    }
}
