//! Value types for krystal-rdbc
//!
//! - [`Value`]: a single SQL value as read from or written to a row
//! - [`SqlType`]: the declared type of a result column, used for reader matching
//! - [`Row`] and [`QueryResult`]: the immutable output of one execution

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Declared SQL type of a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    /// Column type unknown or value is NULL
    Null,
    /// BOOLEAN / BIT
    Boolean,
    /// SMALLINT
    SmallInt,
    /// INTEGER
    Integer,
    /// BIGINT
    BigInt,
    /// REAL
    Real,
    /// DOUBLE PRECISION / FLOAT
    Double,
    /// NUMERIC / DECIMAL
    Decimal,
    /// VARCHAR / TEXT / CHAR
    Varchar,
    /// BINARY / BYTEA / VARBINARY
    Binary,
    /// DATE
    Date,
    /// TIME
    Time,
    /// TIMESTAMP
    Timestamp,
    /// TIMESTAMP WITH TIME ZONE
    TimestampTz,
    /// UUID / UNIQUEIDENTIFIER
    Uuid,
    /// JSON
    Json,
}

impl SqlType {
    /// Get SQL type name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Boolean => "BOOLEAN",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Double => "DOUBLE PRECISION",
            Self::Decimal => "DECIMAL",
            Self::Varchar => "VARCHAR",
            Self::Binary => "BINARY",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMPTZ",
            Self::Uuid => "UUID",
            Self::Json => "JSON",
        }
    }

    /// Whether values of this type are numbers
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::SmallInt | Self::Integer | Self::BigInt | Self::Real | Self::Double | Self::Decimal
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SQL value type that can hold any database value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer (SMALLINT)
    Int16(i16),
    /// 32-bit signed integer (INTEGER)
    Int32(i32),
    /// 64-bit signed integer (BIGINT)
    Int64(i64),
    /// 32-bit floating point (REAL)
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION)
    Float64(f64),
    /// Arbitrary precision decimal (NUMERIC, DECIMAL)
    Decimal(Decimal),
    /// Text string (VARCHAR, TEXT, CHAR)
    String(String),
    /// Binary data (BYTEA, BLOB, VARBINARY)
    Bytes(Vec<u8>),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Time without date (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP)
    DateTime(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    DateTimeTz(DateTime<Utc>),
    /// UUID
    Uuid(Uuid),
    /// JSON value
    Json(serde_json::Value),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the SQL type of this value
    pub fn sql_type(&self) -> SqlType {
        match self {
            Self::Null => SqlType::Null,
            Self::Bool(_) => SqlType::Boolean,
            Self::Int16(_) => SqlType::SmallInt,
            Self::Int32(_) => SqlType::Integer,
            Self::Int64(_) => SqlType::BigInt,
            Self::Float32(_) => SqlType::Real,
            Self::Float64(_) => SqlType::Double,
            Self::Decimal(_) => SqlType::Decimal,
            Self::String(_) => SqlType::Varchar,
            Self::Bytes(_) => SqlType::Binary,
            Self::Date(_) => SqlType::Date,
            Self::Time(_) => SqlType::Time,
            Self::DateTime(_) => SqlType::Timestamp,
            Self::DateTimeTz(_) => SqlType::TimestampTz,
            Self::Uuid(_) => SqlType::Uuid,
            Self::Json(_) => SqlType::Json,
        }
    }

    /// Try to convert to bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int16(n) => Some(*n != 0),
            Self::Int32(n) => Some(*n != 0),
            Self::Int64(n) => Some(*n != 0),
            Self::String(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Some(true),
                "false" | "f" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(n) => Some(i64::from(*n)),
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            Self::Float32(n) if n.is_finite() => Some(*n as i64),
            Self::Float64(n) if n.is_finite() => Some(*n as i64),
            Self::Decimal(d) => d.trunc().to_string().parse().ok(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to i32, failing on overflow
    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|n| i32::try_from(n).ok())
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int16(n) => Some(f64::from(*n)),
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Int64(n) => Some(*n as f64),
            Self::Float32(n) => Some(f64::from(*n)),
            Self::Float64(n) => Some(*n),
            Self::Decimal(d) => d.to_string().parse().ok(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to convert to a date
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::DateTime(dt) => Some(dt.date()),
            Self::DateTimeTz(dt) => Some(dt.date_naive()),
            _ => None,
        }
    }

    /// Try to convert to a timestamp
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::DateTimeTz(dt) => Some(dt.naive_utc()),
            Self::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Try to convert to UUID
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            Self::String(s) => Uuid::parse_str(s).ok(),
            Self::Bytes(b) if b.len() == 16 => Uuid::from_slice(b).ok(),
            _ => None,
        }
    }

    /// Convert to an owned string, `None` for NULL
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Compare two values the way a SQL predicate would.
    ///
    /// Numbers compare numerically across widths, temporal values compare
    /// chronologically, everything else falls back to its string form.
    /// NULL is incomparable.
    pub fn compare(&self, other: &Value) -> Option<std::cmp::Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        if self.sql_type().is_numeric() || other.sql_type().is_numeric() {
            if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
                return a.partial_cmp(&b);
            }
        }
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            (Self::DateTime(_) | Self::DateTimeTz(_), _)
            | (_, Self::DateTime(_) | Self::DateTimeTz(_)) => {
                Some(self.as_datetime()?.cmp(&other.as_datetime()?))
            }
            _ => Some(self.to_string().cmp(&other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int16(n) => write!(f, "{n}"),
            Self::Int32(n) => write!(f, "{n}"),
            Self::Int64(n) => write!(f, "{n}"),
            Self::Float32(n) => write!(f, "{n}"),
            Self::Float64(n) => write!(f, "{n}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Date(d) => write!(f, "{d}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeTz(dt) => write!(f, "{dt}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
        }
    }
}

/// Implement From traits for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// Database row as ordered column values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names
    columns: Vec<String>,
    /// Column values (same order as columns)
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get value by column name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Take the values, dropping column names
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Convert row to HashMap
    pub fn into_map(self) -> HashMap<String, Value> {
        self.columns.into_iter().zip(self.values).collect()
    }
}

/// Name and declared type of one result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    /// Column label as returned by the driver
    pub name: String,
    /// Declared column type
    pub sql_type: SqlType,
}

impl ResultColumn {
    /// Create column metadata
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// Column label used for affected-row counts of write batches
pub const AFFECTED_COLUMN: &str = "#";

/// Immutable output of one statement execution.
///
/// Pairs ordered column metadata with the rows read. Write batches produce a
/// singleton result whose only column, [`AFFECTED_COLUMN`], holds the count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    columns: Vec<ResultColumn>,
    rows: Vec<Row>,
}

impl QueryResult {
    /// Create a result from column metadata and rows
    pub fn new(columns: Vec<ResultColumn>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Result with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    /// Singleton result carrying an affected-row count
    pub fn affected(count: u64) -> Self {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        Self {
            columns: vec![ResultColumn::new(AFFECTED_COLUMN, SqlType::BigInt)],
            rows: vec![Row::new(
                vec![AFFECTED_COLUMN.to_string()],
                vec![Value::Int64(count)],
            )],
        }
    }

    /// Affected-row count, if this is a write result
    pub fn affected_rows(&self) -> Option<u64> {
        match self.columns.as_slice() {
            [col] if col.name == AFFECTED_COLUMN => self
                .rows
                .first()
                .and_then(|r| r.get(0))
                .and_then(Value::as_i64)
                .and_then(|n| u64::try_from(n).ok()),
            _ => None,
        }
    }

    /// Column metadata in result order
    #[inline]
    pub fn columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    /// Declared column types in result order
    pub fn column_types(&self) -> Vec<SqlType> {
        self.columns.iter().map(|c| c.sql_type).collect()
    }

    /// Rows in result order
    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// First row
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Number of rows
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take the rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Column metadata by name, ignoring case
    pub fn column(&self, name: &str) -> Option<&ResultColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Every value of one column, top to bottom
    pub fn get_column(&self, name: &str) -> Option<Vec<Value>> {
        let idx = self.position(name)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.get(idx).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Keep only the named columns, in the order given
    pub fn get_columns(&self, names: &[&str]) -> Result<QueryResult> {
        let picked: Vec<usize> = names
            .iter()
            .map(|n| self.position(n).ok_or_else(|| missing_column(n)))
            .collect::<Result<_>>()?;
        let columns: Vec<ResultColumn> = picked.iter().map(|&i| self.columns[i].clone()).collect();
        let labels: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let values = picked
                    .iter()
                    .map(|&i| r.get(i).cloned().unwrap_or(Value::Null))
                    .collect();
                Row::new(labels.clone(), values)
            })
            .collect();
        Ok(QueryResult::new(columns, rows))
    }

    /// First value of the first row
    pub fn get_result(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.get(0))
    }

    /// Value of the named column in the first row
    pub fn get_result_at(&self, name: &str) -> Option<&Value> {
        let idx = self.position(name)?;
        self.rows.first().and_then(|r| r.get(idx))
    }

    /// Turn name/value pairs into columns.
    ///
    /// Rows are grouped by every column other than `fields` and `values`; each
    /// group becomes one row with a VARCHAR column per field name holding the
    /// textual value. The new columns are `into` when given (absent fields stay
    /// NULL, unknown fields are dropped), otherwise every distinct non-null
    /// field name in sorted order. Groups keep the order they first appear in.
    pub fn unpivot(&self, fields: &str, values: &str, into: &[&str]) -> Result<QueryResult> {
        let fields_idx = self.position(fields).ok_or_else(|| missing_column(fields))?;
        let values_idx = self.position(values).ok_or_else(|| missing_column(values))?;
        let group_idx: Vec<usize> = (0..self.columns.len())
            .filter(|&i| i != fields_idx && i != values_idx)
            .collect();

        let new_columns: Vec<String> = if into.is_empty() {
            let mut names: Vec<String> = self
                .rows
                .iter()
                .filter_map(|r| r.get(fields_idx))
                .filter(|v| !v.is_null())
                .map(Value::to_string)
                .collect();
            names.sort();
            names.dedup();
            names
        } else {
            into.iter().map(|s| s.to_string()).collect()
        };

        let mut columns: Vec<ResultColumn> =
            group_idx.iter().map(|&i| self.columns[i].clone()).collect();
        columns.extend(
            new_columns
                .iter()
                .map(|name| ResultColumn::new(name.clone(), SqlType::Varchar)),
        );
        let labels: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut grouped: Vec<Vec<Value>> = Vec::new();
        for row in &self.rows {
            let cell = |i: usize| row.get(i).cloned().unwrap_or(Value::Null);
            let group: Vec<Value> = group_idx.iter().map(|&i| cell(i)).collect();
            let slot = *index.entry(format!("{:?}", group)).or_insert_with(|| {
                let mut values = group.clone();
                values.resize(group.len() + new_columns.len(), Value::Null);
                grouped.push(values);
                grouped.len() - 1
            });

            let field = cell(fields_idx);
            if field.is_null() {
                continue;
            }
            let field = field.to_string();
            if let Some(pos) = new_columns.iter().position(|c| c.eq_ignore_ascii_case(&field)) {
                let value = cell(values_idx);
                grouped[slot][group_idx.len() + pos] = if value.is_null() {
                    Value::Null
                } else {
                    Value::String(value.to_string())
                };
            }
        }

        let rows = grouped
            .into_iter()
            .map(|values| Row::new(labels.clone(), values))
            .collect();
        Ok(QueryResult::new(columns, rows))
    }

    /// Plain-text table with a `name (TYPE)` header, for logs
    pub fn render_table(&self) -> String {
        let header: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name, c.sql_type))
            .collect();
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.values().iter().map(Value::to_string).collect())
            .collect();

        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
        for row in &body {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }

        let line = |cells: &[String]| {
            let padded: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, w)| format!("{:<w$}", cells.get(i).map(String::as_str).unwrap_or(""), w = *w))
                .collect();
            format!("| {} |", padded.join(" | "))
        };
        let rule = format!(
            "|{}|",
            widths
                .iter()
                .map(|w| "-".repeat(w + 2))
                .collect::<Vec<_>>()
                .join("|")
        );

        let mut out = vec![line(&header), rule];
        out.extend(body.iter().map(|r| line(r)));
        out.join("\n")
    }
}

fn missing_column(name: &str) -> Error {
    Error::type_conversion(format!("result has no column '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int32(0).is_null());
        assert_eq!(Value::Null.sql_type(), SqlType::Null);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::String("yes".into()).as_bool(), Some(true));
        assert_eq!(Value::String("false".into()).as_bool(), Some(false));

        assert_eq!(Value::Int32(42).as_i64(), Some(42));
        assert_eq!(Value::Int64(i64::MAX).as_i32(), None);
        assert_eq!(Value::Float64(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::String(" 7 ".into()).as_i64(), Some(7));
    }

    #[test]
    fn test_value_compare_across_widths() {
        use std::cmp::Ordering;

        assert_eq!(
            Value::Int16(3).compare(&Value::Int64(4)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Int32(9000).compare(&Value::String("9000".into())),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Null.compare(&Value::Int32(1)), None);
    }

    #[test]
    fn test_row_operations() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::Int32(1), Value::String("Alice".into())],
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int32(1)));
        assert_eq!(
            row.get_by_name("NAME"),
            Some(&Value::String("Alice".into()))
        ); // case-insensitive
    }

    fn readings() -> QueryResult {
        let labels = vec!["linia".to_string(), "pole".to_string(), "wartosc".to_string()];
        let row = |linia: i32, pole: &str, wartosc: Value| {
            Row::new(labels.clone(), vec![Value::Int32(linia), pole.into(), wartosc])
        };
        QueryResult::new(
            vec![
                ResultColumn::new("linia", SqlType::Integer),
                ResultColumn::new("pole", SqlType::Varchar),
                ResultColumn::new("wartosc", SqlType::Integer),
            ],
            vec![
                row(1, "temp", Value::Int32(80)),
                row(2, "temp", Value::Int32(75)),
                row(1, "cisnienie", Value::Int32(3)),
                row(2, "obroty", Value::Null),
            ],
        )
    }

    #[test]
    fn test_unpivot_derives_sorted_columns() {
        let result = readings().unpivot("POLE", "wartosc", &[]).unwrap();
        let names: Vec<&str> = result.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["linia", "cisnienie", "obroty", "temp"]);
        assert_eq!(
            result.column_types(),
            vec![SqlType::Integer, SqlType::Varchar, SqlType::Varchar, SqlType::Varchar]
        );
        assert_eq!(result.len(), 2);
        assert_eq!(
            result.rows()[0].values(),
            &[Value::Int32(1), "3".into(), Value::Null, "80".into()]
        );
        assert_eq!(result.rows()[1].get_by_name("temp"), Some(&Value::from("75")));
        assert_eq!(result.rows()[1].get_by_name("obroty"), Some(&Value::Null));
    }

    #[test]
    fn test_unpivot_into_given_columns() {
        let result = readings().unpivot("pole", "wartosc", &["temp", "wilgotnosc"]).unwrap();
        let names: Vec<&str> = result.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["linia", "temp", "wilgotnosc"]);
        assert_eq!(result.rows()[0].values(), &[Value::Int32(1), "80".into(), Value::Null]);
        assert!(readings().unpivot("brak", "wartosc", &[]).is_err());
    }

    #[test]
    fn test_column_accessors() {
        let result = readings();
        assert_eq!(result.column("POLE").map(|c| c.sql_type), Some(SqlType::Varchar));
        assert_eq!(
            result.get_column("linia"),
            Some(vec![Value::Int32(1), Value::Int32(2), Value::Int32(1), Value::Int32(2)])
        );
        assert_eq!(result.get_column("brak"), None);
        assert_eq!(result.get_result(), Some(&Value::Int32(1)));
        assert_eq!(result.get_result_at("wartosc"), Some(&Value::Int32(80)));

        let narrowed = result.get_columns(&["wartosc", "linia"]).unwrap();
        assert_eq!(narrowed.column_types(), vec![SqlType::Integer, SqlType::Integer]);
        assert_eq!(narrowed.rows()[0].values(), &[Value::Int32(80), Value::Int32(1)]);
        assert!(result.get_columns(&["brak"]).is_err());
    }

    #[test]
    fn test_render_table() {
        let result = QueryResult::new(
            vec![
                ResultColumn::new("id", SqlType::Integer),
                ResultColumn::new("nazwa", SqlType::Varchar),
            ],
            vec![Row::new(
                vec!["id".into(), "nazwa".into()],
                vec![Value::Int32(7), "Prasa hydrauliczna".into()],
            )],
        );
        let expected = format!(
            "| {:<12} | {:<18} |\n|{}|{}|\n| {:<12} | {:<18} |",
            format!("id ({})", SqlType::Integer),
            format!("nazwa ({})", SqlType::Varchar),
            "-".repeat(14),
            "-".repeat(20),
            "7",
            "Prasa hydrauliczna"
        );
        assert_eq!(result.render_table(), expected);
    }

    #[test]
    fn test_affected_result() {
        let result = QueryResult::affected(3);
        assert_eq!(result.affected_rows(), Some(3));
        assert_eq!(result.column_types(), vec![SqlType::BigInt]);

        assert_eq!(QueryResult::empty().affected_rows(), None);
    }
}
