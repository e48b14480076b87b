//! Structured payload values carried across the bridge.
//!
//! `BridgeValue` is the tagged form of every `data` / `responseData` payload.
//! Mappings keep insertion order so encoding is deterministic.

use crate::error::CodecError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::Display;

/// Ordered mapping of string keys to values
pub type ValueMap = IndexMap<String, BridgeValue>;

/// Payload value (must be serializable)
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BridgeValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Sequence of values
    Array(Vec<BridgeValue>),
    /// Mapping of values
    Object(ValueMap),
}

impl Serialize for BridgeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BridgeValue::Null => serializer.serialize_unit(),
            BridgeValue::Bool(b) => serializer.serialize_bool(*b),
            BridgeValue::Integer(n) => serializer.serialize_i64(*n),
            BridgeValue::Float(n) if n.is_finite() => serializer.serialize_f64(*n),
            // JSON has no NaN/Infinity; send the textual form instead
            BridgeValue::Float(n) => serializer.collect_str(n),
            BridgeValue::String(s) => serializer.serialize_str(s),
            BridgeValue::Array(items) => items.serialize(serializer),
            BridgeValue::Object(map) => map.serialize(serializer),
        }
    }
}

impl BridgeValue {
    /// Convert any serializable native value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, CodecError> {
        serde_json::to_value(value)
            .map(Self::from)
            .map_err(CodecError::Encode)
    }

    /// Convert a native value, degrading to its textual form when it has no
    /// structured representation (e.g. maps keyed by non-string types).
    pub fn from_serialize_lossy<T: Serialize + Display + ?Sized>(value: &T) -> Self {
        Self::from_serialize(value).unwrap_or_else(|_| BridgeValue::String(value.to_string()))
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, BridgeValue::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BridgeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BridgeValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as float, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BridgeValue::Integer(n) => Some(*n as f64),
            BridgeValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BridgeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&Vec<BridgeValue>> {
        match self {
            BridgeValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as object
    pub fn as_object(&self) -> Option<&ValueMap> {
        match self {
            BridgeValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Take the mapping out of an object value
    pub fn into_object(self) -> Option<ValueMap> {
        match self {
            BridgeValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Look up a key when this is an object
    pub fn get(&self, key: &str) -> Option<&BridgeValue> {
        self.as_object().and_then(|obj| obj.get(key))
    }

    /// Convert into a `serde_json::Value`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BridgeValue::Null => serde_json::Value::Null,
            BridgeValue::Bool(b) => serde_json::Value::Bool(*b),
            BridgeValue::Integer(n) => serde_json::Value::from(*n),
            BridgeValue::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(n.to_string())),
            BridgeValue::String(s) => serde_json::Value::String(s.clone()),
            BridgeValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(BridgeValue::to_json).collect())
            }
            BridgeValue::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for BridgeValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => BridgeValue::Null,
            serde_json::Value::Bool(b) => BridgeValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => BridgeValue::Integer(i),
                None => n
                    .as_f64()
                    .map(BridgeValue::Float)
                    .unwrap_or_else(|| BridgeValue::String(n.to_string())),
            },
            serde_json::Value::String(s) => BridgeValue::String(s),
            serde_json::Value::Array(items) => {
                BridgeValue::Array(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => {
                BridgeValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<bool> for BridgeValue {
    fn from(b: bool) -> Self {
        BridgeValue::Bool(b)
    }
}

impl From<i32> for BridgeValue {
    fn from(n: i32) -> Self {
        BridgeValue::Integer(n.into())
    }
}

impl From<i64> for BridgeValue {
    fn from(n: i64) -> Self {
        BridgeValue::Integer(n)
    }
}

impl From<u32> for BridgeValue {
    fn from(n: u32) -> Self {
        BridgeValue::Integer(n.into())
    }
}

impl From<f64> for BridgeValue {
    fn from(n: f64) -> Self {
        BridgeValue::Float(n)
    }
}

impl From<String> for BridgeValue {
    fn from(s: String) -> Self {
        BridgeValue::String(s)
    }
}

impl From<&str> for BridgeValue {
    fn from(s: &str) -> Self {
        BridgeValue::String(s.to_string())
    }
}

impl From<ValueMap> for BridgeValue {
    fn from(map: ValueMap) -> Self {
        BridgeValue::Object(map)
    }
}

impl<T: Into<BridgeValue>> From<Vec<T>> for BridgeValue {
    fn from(v: Vec<T>) -> Self {
        BridgeValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<BridgeValue>> From<Option<T>> for BridgeValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(BridgeValue::Null)
    }
}

impl<K: Into<String>, V: Into<BridgeValue>> FromIterator<(K, V)> for BridgeValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        BridgeValue::Object(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Default for BridgeValue {
    fn default() -> Self {
        BridgeValue::Null
    }
}
