//! Schema catalog: per-table column metadata supplied by the host.
//!
//! The engine never introspects the database itself. The host hands it a
//! [`SchemaCatalog`] (one [`ColumnMap`] per schema-qualified table) and the
//! catalog answers two questions everywhere else in the crate:
//! - is this column known, and of what type / nullability;
//! - how does a raw request value become a typed bind value for it.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use sea_query::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// SQL data type of a column, as reported by the host's introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Boolean,
    File,
    Date,
    Timestamp,
    Json,
    Jsonb,
    Text,
    Uuid,
    /// Any type the engine has no special handling for; bound as text.
    #[serde(other)]
    Other,
}

impl ColumnType {
    /// Whether values for this column go through integer coercion.
    pub fn is_integer(self) -> bool {
        self == ColumnType::Integer
    }

    /// Whether this column holds a point in time (cursor values get the
    /// ISO-boundary treatment).
    pub fn is_temporal(self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Timestamp)
    }

    /// Coerce a raw request value (query parameter or body field) into a
    /// typed bind value for this column.
    ///
    /// Integer columns are the only ones that reject outright
    /// (`INTEGER_REQUIRED`); for the rest, unparseable input falls back to a
    /// text bind and the database gets the final word.
    pub fn coerce(self, value: &Json) -> EngineResult<Value> {
        match self {
            ColumnType::Integer => coerce_integer(value),
            ColumnType::Boolean => Ok(coerce_boolean(value)),
            ColumnType::Date => Ok(coerce_date(value)),
            ColumnType::Timestamp => Ok(coerce_timestamp(value)),
            ColumnType::Uuid => Ok(coerce_uuid(value)),
            ColumnType::Json | ColumnType::Jsonb => Ok(match value {
                Json::Null => Value::Json(None),
                other => Value::Json(Some(Box::new(other.clone()))),
            }),
            ColumnType::String | ColumnType::Text | ColumnType::File | ColumnType::Other => {
                Ok(coerce_text(value))
            }
        }
    }
}

/// Metadata for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub data_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
}

/// Column name → metadata for one table.
pub type ColumnMap = HashMap<String, ColumnInfo>;

/// All table metadata known to the engine, keyed by `schema.table`.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: HashMap<String, ColumnMap>,
}

impl SchemaCatalog {
    pub fn new(tables: HashMap<String, ColumnMap>) -> Self {
        Self { tables }
    }

    /// Column map for a schema-qualified table, if known.
    pub fn columns(&self, schema: &str, table: &str) -> Option<&ColumnMap> {
        self.tables.get(&format!("{schema}.{table}"))
    }
}

/// Look up a column's type, accepting dotted keys (`table.column`).
pub fn column_type(columns: &ColumnMap, key: &str) -> Option<ColumnType> {
    let name = key.rsplit('.').next().unwrap_or(key);
    columns.get(name).map(|info| info.data_type)
}

/// Coerce a value by the column's catalog type; unknown columns bind as text.
pub fn coerce_for_column(columns: &ColumnMap, key: &str, value: &Json) -> EngineResult<Value> {
    match column_type(columns, key) {
        Some(data_type) => data_type.coerce(value),
        None => Ok(coerce_text(value)),
    }
}

fn coerce_integer(value: &Json) -> EngineResult<Value> {
    match value {
        Json::Null => Ok(Value::BigInt(None)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::BigInt(Some(i)))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Double(Some(f)))
            } else {
                Err(EngineError::IntegerRequired)
            }
        }
        Json::String(s) => {
            if let Ok(i) = s.parse::<i64>() {
                Ok(Value::BigInt(Some(i)))
            } else if let Ok(f) = s.parse::<f64>() {
                Ok(Value::Double(Some(f)))
            } else {
                Err(EngineError::IntegerRequired)
            }
        }
        _ => Err(EngineError::IntegerRequired),
    }
}

fn coerce_boolean(value: &Json) -> Value {
    match value {
        Json::Null => Value::Bool(None),
        Json::Bool(b) => Value::Bool(Some(*b)),
        Json::String(s) => match s.as_str() {
            "true" | "t" | "1" => Value::Bool(Some(true)),
            "false" | "f" | "0" => Value::Bool(Some(false)),
            // Unrecognized spelling: bind as text and let the database reject it.
            other => Value::String(Some(Box::new(other.to_string()))),
        },
        other => coerce_text(other),
    }
}

fn coerce_date(value: &Json) -> Value {
    match value {
        Json::Null => Value::ChronoDate(None),
        Json::String(s) => {
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Value::ChronoDate(Some(Box::new(date)))
            } else if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                Value::ChronoDateTimeUtc(Some(Box::new(dt.to_utc())))
            } else {
                coerce_text(value)
            }
        }
        other => coerce_text(other),
    }
}

fn coerce_timestamp(value: &Json) -> Value {
    match value {
        Json::Null => Value::ChronoDateTimeUtc(None),
        Json::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                Value::ChronoDateTimeUtc(Some(Box::new(dt.to_utc())))
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                Value::ChronoDateTime(Some(Box::new(dt)))
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                Value::ChronoDateTime(Some(Box::new(dt)))
            } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Value::ChronoDate(Some(Box::new(date)))
            } else {
                coerce_text(value)
            }
        }
        Json::Number(n) => match n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)) {
            Some(dt) => Value::ChronoDateTimeUtc(Some(Box::new(dt))),
            None => coerce_text(value),
        },
        other => coerce_text(other),
    }
}

fn coerce_uuid(value: &Json) -> Value {
    match value {
        Json::Null => Value::Uuid(None),
        Json::String(s) => match Uuid::parse_str(s) {
            Ok(uuid) => Value::Uuid(Some(Box::new(uuid))),
            Err(_) => coerce_text(value),
        },
        other => coerce_text(other),
    }
}

/// Fallback coercion: bind as text.
pub fn coerce_text(value: &Json) -> Value {
    match value {
        Json::Null => Value::String(None),
        Json::String(s) => Value::String(Some(Box::new(s.clone()))),
        Json::Bool(b) => Value::String(Some(Box::new(b.to_string()))),
        Json::Number(n) => Value::String(Some(Box::new(n.to_string()))),
        other => Value::String(Some(Box::new(other.to_string()))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> ColumnMap {
        HashMap::from([
            (
                "id".to_string(),
                ColumnInfo {
                    data_type: ColumnType::Integer,
                    nullable: false,
                },
            ),
            (
                "name".to_string(),
                ColumnInfo {
                    data_type: ColumnType::String,
                    nullable: true,
                },
            ),
            (
                "created".to_string(),
                ColumnInfo {
                    data_type: ColumnType::Timestamp,
                    nullable: false,
                },
            ),
        ])
    }

    #[test]
    fn integer_column_rejects_non_numeric() {
        let err = ColumnType::Integer.coerce(&json!("abc")).unwrap_err();
        assert!(matches!(err, EngineError::IntegerRequired));
    }

    #[test]
    fn integer_column_accepts_numeric_strings() {
        assert_eq!(
            ColumnType::Integer.coerce(&json!("42")).unwrap(),
            Value::BigInt(Some(42))
        );
        assert_eq!(
            ColumnType::Integer.coerce(&json!(7)).unwrap(),
            Value::BigInt(Some(7))
        );
    }

    #[test]
    fn integer_null_binds_typed_null() {
        assert_eq!(
            ColumnType::Integer.coerce(&Json::Null).unwrap(),
            Value::BigInt(None)
        );
    }

    #[test]
    fn boolean_column_parses_common_spellings() {
        assert_eq!(
            ColumnType::Boolean.coerce(&json!("true")).unwrap(),
            Value::Bool(Some(true))
        );
        assert_eq!(
            ColumnType::Boolean.coerce(&json!("0")).unwrap(),
            Value::Bool(Some(false))
        );
    }

    #[test]
    fn timestamp_column_parses_rfc3339() {
        let coerced = ColumnType::Timestamp
            .coerce(&json!("2025-03-01T10:00:00Z"))
            .unwrap();
        assert!(matches!(coerced, Value::ChronoDateTimeUtc(Some(_))));
    }

    #[test]
    fn uuid_column_parses_uuid_strings() {
        let coerced = ColumnType::Uuid
            .coerce(&json!("00000000-0000-0000-0000-000000000000"))
            .unwrap();
        assert!(matches!(coerced, Value::Uuid(Some(_))));
    }

    #[test]
    fn dotted_keys_resolve_to_last_segment() {
        let cols = columns();
        assert_eq!(column_type(&cols, "users.id"), Some(ColumnType::Integer));
        assert_eq!(column_type(&cols, "id"), Some(ColumnType::Integer));
        assert_eq!(column_type(&cols, "users.missing"), None);
    }

    #[test]
    fn column_type_deserializes_unknown_as_other() {
        let info: ColumnInfo =
            serde_json::from_value(json!({"data_type": "interval", "nullable": true})).unwrap();
        assert_eq!(info.data_type, ColumnType::Other);
    }

    #[test]
    fn catalog_lookup_is_schema_qualified() {
        let catalog = SchemaCatalog::new(HashMap::from([("public.users".to_string(), columns())]));
        assert!(catalog.columns("public", "users").is_some());
        assert!(catalog.columns("audit", "users").is_none());
    }
}
