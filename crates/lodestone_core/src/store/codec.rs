//! Column value encoding.
//!
//! # Responsibility
//! - Convert validated attribute values into SQLite bind values.
//! - Convert stored column values back into raw attribute values.
//!
//! # Invariants
//! - List, pair and nested-entity values are written as JSON text.
//! - JSON columns are read back as text; entities decode them on first `get`.
//! - SQL `NULL` is read back as an absent attribute.

use super::layout::ColumnEncoding;
use crate::model::Value;
use rusqlite::types::Value as SqlValue;

/// Encodes one attribute value for its column.
///
/// Returns the offending value's display form when the value cannot be
/// represented under `encoding`.
pub(crate) fn encode(encoding: ColumnEncoding, value: &Value) -> Result<SqlValue, String> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let encoded = match encoding {
        ColumnEncoding::Integer => value
            .cast_text()
            .and_then(|text| text.parse::<i64>().ok())
            .map(SqlValue::Integer),
        ColumnEncoding::Real => value
            .cast_text()
            .and_then(|text| text.parse::<f64>().ok())
            .map(SqlValue::Real),
        ColumnEncoding::Boolean => match value.cast_text().as_deref() {
            Some("true") => Some(SqlValue::Integer(1)),
            Some("false") => Some(SqlValue::Integer(0)),
            _ => None,
        },
        ColumnEncoding::Text => Some(match value {
            Value::Text(text) => SqlValue::Text(text.clone()),
            Value::Integer(number) => SqlValue::Integer(*number),
            Value::Float(number) => SqlValue::Real(*number),
            other => SqlValue::Text(other.to_string()),
        }),
        ColumnEncoding::Json => Some(match value {
            // Still-encoded text read from storage is written back unchanged.
            Value::Text(encoded) => SqlValue::Text(encoded.clone()),
            other => SqlValue::Text(other.to_json().to_string()),
        }),
    };

    encoded.ok_or_else(|| value.to_string())
}

/// Decodes one stored column value; `None` means the attribute is absent.
pub(crate) fn decode(encoding: ColumnEncoding, stored: SqlValue) -> Option<Value> {
    let value = match (encoding, stored) {
        (_, SqlValue::Null) => return None,
        (ColumnEncoding::Boolean, SqlValue::Integer(flag)) => Value::Boolean(flag != 0),
        (ColumnEncoding::Real, SqlValue::Integer(number)) => Value::Float(number as f64),
        (_, SqlValue::Integer(number)) => Value::Integer(number),
        (_, SqlValue::Real(number)) => Value::Float(number),
        (_, SqlValue::Text(text)) => Value::Text(text),
        (_, SqlValue::Blob(bytes)) => Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
    };
    Some(value)
}
