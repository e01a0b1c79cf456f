//! Statement-related data models.
//!
//! This module defines parameter values, named parameter sets, prepared
//! statements and execution metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Infer a parameter from command-line text.
    ///
    /// `null`, `true`/`false`, integers and floats are recognized; anything else
    /// is bound as a string.
    pub fn infer(text: &str) -> Self {
        if text.eq_ignore_ascii_case("null") {
            Self::Null
        } else if text.eq_ignore_ascii_case("true") {
            Self::Bool(true)
        } else if text.eq_ignore_ascii_case("false") {
            Self::Bool(false)
        } else if let Ok(v) = text.parse::<i64>() {
            Self::Int(v)
        } else if let Ok(v) = text.parse::<f64>() {
            Self::Float(v)
        } else {
            Self::String(text.to_string())
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Named statement parameters, referenced as `:name` in SQL text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, QueryParam>);

impl Params {
    /// An empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&QueryParam> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<QueryParam>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A statement ready for the driver: SQL with positional `?` placeholders and
/// the values to bind, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<QueryParam>,
}

impl Statement {
    /// A statement sent as-is, without binding.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// True when the statement has nothing to bind and can use the text protocol.
    pub fn is_raw(&self) -> bool {
        self.args.is_empty()
    }
}

/// Execution metadata reported by the driver when a statement completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecInfo {
    pub rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_param() {
        assert_eq!(QueryParam::infer("NULL"), QueryParam::Null);
        assert_eq!(QueryParam::infer("true"), QueryParam::Bool(true));
        assert_eq!(QueryParam::infer("42"), QueryParam::Int(42));
        assert_eq!(QueryParam::infer("2.5"), QueryParam::Float(2.5));
        assert_eq!(
            QueryParam::infer("2021-01-01"),
            QueryParam::String("2021-01-01".to_string())
        );
    }

    #[test]
    fn test_params_builder() {
        let params = Params::new().bind("id", 7).bind("name", "widget");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("id"), Some(&QueryParam::Int(7)));
        assert!(params.get("missing").is_none());
    }

    #[test]
    fn test_option_param_is_null() {
        let none: Option<i64> = None;
        assert!(QueryParam::from(none).is_null());
        assert_eq!(QueryParam::from(Some(3i64)), QueryParam::Int(3));
    }

    #[test]
    fn test_params_deserialize_from_json() {
        let params: Params = serde_json::from_str(r#"{"id": 1, "tag": "a"}"#).unwrap();
        assert_eq!(params.get("id"), Some(&QueryParam::Int(1)));
        assert_eq!(params.get("tag"), Some(&QueryParam::String("a".into())));
    }

    #[test]
    fn test_raw_statement() {
        let stmt = Statement::raw("COMMIT");
        assert!(stmt.is_raw());
        assert_eq!(stmt.sql, "COMMIT");
    }
}
