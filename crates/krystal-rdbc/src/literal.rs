//! Inline SQL literal encoding.
//!
//! [`format_literal`] is the only place values become SQL text; every
//! statement kind renders its values through it. [`parse_literal`] reverses
//! the encoding for a known column type.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::security::escape_string_literal;
use crate::types::{SqlType, Value};

const TIME_FORMAT: &str = "%H:%M:%S";

/// Date patterns used when quoting temporal values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralFormat {
    /// chrono pattern for DATE values
    pub date_format: String,
    /// chrono pattern for TIMESTAMP values
    pub datetime_format: String,
}

impl LiteralFormat {
    /// Create a format pair
    pub fn new(date_format: impl Into<String>, datetime_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into(),
            datetime_format: datetime_format.into(),
        }
    }
}

impl Default for LiteralFormat {
    fn default() -> Self {
        Self::new("%Y-%m-%d", "%Y-%m-%d %H:%M:%S")
    }
}

fn quoted(text: &str) -> String {
    format!("'{}'", escape_string_literal(text))
}

/// Encode a value as an inline SQL literal.
///
/// | value                        | literal               |
/// |------------------------------|-----------------------|
/// | NULL, or the string `null`   | `NULL`                |
/// | string                       | `'it''s'`             |
/// | date / timestamp             | quoted, configured fmt|
/// | integer, decimal             | `42`                  |
/// | float                        | `4.5` (never `4,5`)   |
/// | bool                         | `1` / `0`             |
/// | anything else                | quoted string form    |
pub fn format_literal(value: &Value, format: &LiteralFormat) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) if s.eq_ignore_ascii_case("null") => "NULL".to_string(),
        Value::String(s) => quoted(s),
        Value::DateTime(dt) => quoted(&dt.format(&format.datetime_format).to_string()),
        Value::DateTimeTz(dt) => quoted(&dt.format(&format.datetime_format).to_string()),
        Value::Date(d) => quoted(&d.format(&format.date_format).to_string()),
        Value::Time(t) => quoted(&t.format(TIME_FORMAT).to_string()),
        Value::Int16(n) => n.to_string(),
        Value::Int32(n) => n.to_string(),
        Value::Int64(n) => n.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Float32(n) if n.is_finite() => n.to_string().replace(',', "."),
        Value::Float64(n) if n.is_finite() => n.to_string().replace(',', "."),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        other => quoted(&other.to_string()),
    }
}

/// Strip the surrounding quotes of a literal and undo `''` escaping.
fn unquote(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

fn conversion(literal: &str, sql_type: SqlType, err: impl std::fmt::Display) -> Error {
    Error::type_conversion(format!("cannot read {literal} as {sql_type}: {err}"))
}

/// Decode an inline literal produced by [`format_literal`] back into a value
/// of the given column type.
///
/// Temporal values only round-trip at the precision of the configured
/// patterns; the default timestamp pattern keeps whole seconds.
pub fn parse_literal(literal: &str, sql_type: SqlType, format: &LiteralFormat) -> Result<Value> {
    let literal = literal.trim();
    if literal == "NULL" || sql_type == SqlType::Null {
        return Ok(Value::Null);
    }
    let text = unquote(literal).unwrap_or_else(|| literal.to_string());

    let value = match sql_type {
        SqlType::Null => Value::Null,
        SqlType::Varchar => Value::String(text),
        SqlType::Boolean => match text.as_str() {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => Value::String(other.to_string())
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| conversion(literal, sql_type, "not a boolean"))?,
        },
        SqlType::SmallInt => Value::Int16(
            text.parse()
                .map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::Integer => Value::Int32(
            text.parse()
                .map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::BigInt => Value::Int64(
            text.parse()
                .map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::Real => Value::Float32(
            text.parse()
                .map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::Double => Value::Float64(
            text.parse()
                .map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::Decimal => Value::Decimal(
            Decimal::from_str(&text).map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::Date => Value::Date(
            NaiveDate::parse_from_str(&text, &format.date_format)
                .map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::Time => Value::Time(
            NaiveTime::parse_from_str(&text, TIME_FORMAT)
                .map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::Timestamp => Value::DateTime(
            NaiveDateTime::parse_from_str(&text, &format.datetime_format)
                .map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::TimestampTz => Value::DateTimeTz(
            NaiveDateTime::parse_from_str(&text, &format.datetime_format)
                .map_err(|e| conversion(literal, sql_type, e))?
                .and_utc(),
        ),
        SqlType::Uuid => Value::Uuid(
            uuid::Uuid::parse_str(&text).map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::Json => Value::Json(
            serde_json::from_str(&text).map_err(|e| conversion(literal, sql_type, e))?,
        ),
        SqlType::Binary => Value::Bytes(decode_hex(&text).ok_or_else(|| {
            conversion(literal, sql_type, "not a hex string")
        })?),
    };
    Ok(value)
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}
