//! Dynamic column values and records.
//!
//! Repositories and the entity manager move data as [`Record`]s: ordered maps
//! from column name to [`Value`]. Entities convert to and from records, which
//! keeps the persistence layer independent of concrete entity types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::EntityError;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Column name to value.
pub type Record = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    /// Convert a JSON value. Arrays and objects are not column values.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float)),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Conversion out of a [`Value`], used when rebuilding entities from records.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// Read a typed field out of a record.
///
/// Missing fields are treated as `Null`, so `Option<T>` fields may be absent.
pub fn field<T: FromValue>(record: &Record, name: &str) -> Result<T, EntityError> {
    let value = record.get(name).unwrap_or(&Value::Null);
    T::from_value(value).ok_or_else(|| {
        if value.is_null() {
            EntityError::MissingField(name.to_string())
        } else {
            EntityError::InvalidType {
                field: name.to_string(),
                found: value.kind(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_scalars_convert_to_values() {
        assert_eq!(Value::from_json(&serde_json::json!(3)), Some(Value::Int(3)));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Some(Value::Float(1.5)));
        assert_eq!(
            Value::from_json(&serde_json::json!("x")),
            Some(Value::Text("x".to_string()))
        );
        assert_eq!(Value::from_json(&serde_json::json!([1])), None);
    }

    #[test]
    fn field_reads_typed_values() {
        let mut record = Record::new();
        record.insert("title".to_string(), Value::from("hello"));
        record.insert("views".to_string(), Value::Int(7));

        let title: String = field(&record, "title").unwrap();
        let views: i64 = field(&record, "views").unwrap();
        let missing: Option<String> = field(&record, "subtitle").unwrap();

        assert_eq!(title, "hello");
        assert_eq!(views, 7);
        assert_eq!(missing, None);
    }

    #[test]
    fn field_reports_missing_and_mistyped() {
        let mut record = Record::new();
        record.insert("views".to_string(), Value::from("many"));

        assert!(matches!(
            field::<String>(&record, "title"),
            Err(EntityError::MissingField(name)) if name == "title"
        ));
        assert!(matches!(
            field::<bool>(&record, "views"),
            Err(EntityError::InvalidType { found: "text", .. })
        ));
    }

    #[test]
    fn values_serialize_untagged() {
        let json = serde_json::to_value(Value::Int(5)).unwrap();
        assert_eq!(json, serde_json::json!(5));
        let back: Value = serde_json::from_value(serde_json::json!(null)).unwrap();
        assert_eq!(back, Value::Null);
    }
}
