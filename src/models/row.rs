//! Result row data models.

use chrono::NaiveDateTime;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Declared column types for a result set, keyed by column name.
pub type ColumnTypes = HashMap<String, String>;

/// A single column value.
///
/// Drivers produce raw values: integers, floats and text stay native while
/// temporal and decimal columns arrive as text. Coercion may later replace
/// a raw value with a typed one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&NaiveDateTime> {
        match self {
            Self::Date(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Text(v) => serializer.serialize_str(v),
            Self::Bytes(v) => serializer.serialize_str(&STANDARD.encode(v)),
            Self::Date(v) => serializer.collect_str(&v.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

/// A result row: column names mapped to values, in result-set order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value, replacing an existing column of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.columns.iter_mut().find(|(col, _)| *col == name) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.columns
            .iter_mut()
            .find(|(col, _)| col == name)
            .map(|(_, v)| v)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(col, _)| col.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(col, v)| (col.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.columns.iter_mut().map(|(col, v)| (col.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v.into());
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_row_keeps_column_order() {
        let row: Row = [("b", "2"), ("a", "1")].into_iter().collect();
        let names: Vec<&str> = row.column_names().collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_row_insert_replaces() {
        let mut row = Row::new();
        row.insert("id", Value::Text("1".into()));
        row.insert("id", Value::Int(1));
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_row_serializes_as_object() {
        let mut row = Row::new();
        row.insert("id", Value::Int(3));
        row.insert("blob", Value::Bytes(b"hi".to_vec()));
        row.insert(
            "at",
            Value::Date(
                NaiveDate::from_ymd_opt(2021, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            ),
        );
        row.insert("gone", Value::Null);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["blob"], "aGk=");
        assert_eq!(json["at"], "2021-01-01T00:00:00");
        assert!(json["gone"].is_null());
    }
}
