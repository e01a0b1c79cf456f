//! Column type handling.
//!
//! # Architecture
//!
//! Type handling has two sides:
//! 1. Drivers decode result rows into raw [`Value`]s and report the declared
//!    type of each column ([`DecodeRow`]).
//! 2. When coercion is enabled, [`convert_row`] uses those declared types to
//!    turn raw values into typed ones, classifying each type with
//!    [`categorize_type`].

use crate::models::{ColumnTypes, Row, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo, ValueRef};
use tracing::debug;

// =============================================================================
// Type Classification
// =============================================================================

/// Coercion category of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// DATE, DATETIME, TIMESTAMP
    Temporal,
    /// DECIMAL, DOUBLE, FLOAT
    Float,
    /// INTEGER, INT, TINYINT, SMALLINT, MEDIUMINT, BIGINT
    Integer,
    /// Left as the raw value
    Other,
}

/// Classify a declared type name.
///
/// Only the base name counts: `DECIMAL(10,2)` is `DECIMAL` and `INT UNSIGNED`
/// is `INT`.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let upper = type_name.trim().to_ascii_uppercase();
    let base = upper
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default();

    match base {
        "DATE" | "DATETIME" | "TIMESTAMP" => TypeCategory::Temporal,
        "DECIMAL" | "DOUBLE" | "FLOAT" => TypeCategory::Float,
        "INTEGER" | "INT" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT" => {
            TypeCategory::Integer
        }
        _ => TypeCategory::Other,
    }
}

// =============================================================================
// Coercion
// =============================================================================

/// Coerce every column of `row` that has a declared type in `types`, in place.
///
/// Columns without a declared type, with an `Other` type, or whose raw value
/// cannot be read as the declared type keep their raw value.
pub fn convert_row(row: &mut Row, types: &ColumnTypes) {
    for (name, value) in row.iter_mut() {
        let Some(type_name) = types.get(name) else {
            continue;
        };
        let category = categorize_type(type_name);
        if let Some(coerced) = coerce_value(value, category) {
            *value = coerced;
        } else if category != TypeCategory::Other && !matches!(value, Value::Null) {
            debug!(column = %name, type_name = %type_name, "Left column value uncoerced");
        }
    }
}

/// Coerce a single value; `None` means the value stays as it is.
pub fn coerce_value(value: &Value, category: TypeCategory) -> Option<Value> {
    match (category, value) {
        (TypeCategory::Temporal, Value::Text(s)) => parse_datetime(s).map(Value::Date),
        (TypeCategory::Temporal, Value::Int(ms)) => {
            DateTime::from_timestamp_millis(*ms).map(|dt| Value::Date(dt.naive_utc()))
        }
        (TypeCategory::Float, Value::Text(s)) => s.trim().parse::<f64>().ok().map(Value::Float),
        (TypeCategory::Float, Value::Int(v)) => Some(Value::Float(*v as f64)),
        (TypeCategory::Integer, Value::Text(s)) => parse_integer(s).map(Value::Int),
        (TypeCategory::Integer, Value::Float(v)) => float_to_i64(*v).map(Value::Int),
        (TypeCategory::Integer, Value::Bool(b)) => Some(Value::Int(i64::from(*b))),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(float_to_i64))
}

/// Truncate toward zero; `None` for NaN, infinities and values outside `i64`.
fn float_to_i64(v: f64) -> Option<i64> {
    // 2^63 is exact in f64, i64::MAX is not
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let t = v.trunc();
    (t >= -LIMIT && t < LIMIT).then_some(t as i64)
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Trait for turning driver rows into raw [`Row`]s plus column metadata.
pub trait DecodeRow {
    fn to_row(&self) -> Row;
    fn column_types(&self) -> ColumnTypes;
}

impl DecodeRow for MySqlRow {
    fn to_row(&self) -> Row {
        let mut row = Row::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let value = mysql::decode_column(self, idx, col.type_info().name());
            row.insert(col.name(), value);
        }
        row
    }

    fn column_types(&self) -> ColumnTypes {
        self.columns()
            .iter()
            .map(|col| (col.name().to_string(), col.type_info().name().to_string()))
            .collect()
    }
}

impl DecodeRow for SqliteRow {
    fn to_row(&self) -> Row {
        let mut row = Row::new();
        for (idx, col) in self.columns().iter().enumerate() {
            row.insert(col.name(), sqlite::decode_column(self, idx));
        }
        row
    }

    fn column_types(&self) -> ColumnTypes {
        self.columns()
            .iter()
            .map(|col| (col.name().to_string(), col.type_info().name().to_string()))
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
        let upper = type_name.to_ascii_uppercase();
        let base = upper.split_whitespace().next().unwrap_or_default();
        if upper == "BOOLEAN" {
            decode_boolean(row, idx)
        } else if matches!(
            base,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR"
        ) {
            decode_integer(row, idx)
        } else if upper == "FLOAT" || upper == "DOUBLE" {
            decode_float(row, idx)
        } else if upper.contains("DECIMAL") {
            decode_decimal(row, idx)
        } else if matches!(upper.as_str(), "DATE" | "DATETIME" | "TIMESTAMP" | "TIME") {
            decode_temporal(row, idx)
        } else if upper.contains("BLOB") || upper.contains("BINARY") || upper == "BIT" {
            decode_binary(row, idx)
        } else {
            decode_text(row, idx)
        }
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Value {
        // Check NULL first
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Null;
        }
        // Try signed types
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Int(v);
        }
        // Try unsigned types
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(v.to_string()));
        }
        Value::Null
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return Value::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return Value::Float(v.into());
        }
        Value::Null
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Value {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => Value::Text(v.0),
            Ok(None) => Value::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                Value::Null
            }
        }
    }

    /// Temporal columns stay text, formatted the way the server writes them.
    fn decode_temporal(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(None) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return Value::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return Value::Text(v.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return Value::Text(v.format("%Y-%m-%d").to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return Value::Text(v.format("%H:%M:%S%.f").to_string());
        }
        decode_text(row, idx)
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Value {
        // Text-like columns (VARCHAR, ENUM, JSON, ...) share one wire format
        row.try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null)
    }
}

mod sqlite {
    use super::*;

    /// Decode by storage class: SQLite values carry their own runtime type.
    pub fn decode_column(row: &SqliteRow, idx: usize) -> Value {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
            Err(e) => {
                tracing::error!("Failed to read SQLite column {}: {:?}", idx, e);
                return Value::Null;
            }
        };

        let decoded = match storage.as_str() {
            "INTEGER" => row.try_get_unchecked::<i64, _>(idx).map(Value::Int),
            "REAL" => row.try_get_unchecked::<f64, _>(idx).map(Value::Float),
            "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(idx).map(Value::Bytes),
            _ => row.try_get_unchecked::<String, _>(idx).map(Value::Text),
        };

        decoded.unwrap_or_else(|e| {
            tracing::error!("Failed to decode SQLite column {}: {:?}", idx, e);
            Value::Null
        })
    }
}
