//! Type-preserving value codec.
//!
//! A schemaless property graph can hold text, numbers, booleans, lists, and
//! maps — but not dates, and it cannot tell a date-as-text apart from a plain
//! string. The codec pairs every stored value with a [`ValueType`] tag so
//! that reads restore the exact runtime value that was written:
//!
//! - dates are stored as RFC 3339 text and decoded back to the same instant
//! - arrays are stored element-wise as the store's native list
//! - objects are stored as the store's native structured map
//!
//! `decode(encode(v)) == v` holds for every supported value. Unsupported
//! runtime values (JSON null) are rejected, never coerced.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::CodecError;

/// A runtime field value as seen by callers of the store.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Boolean(bool),
    /// An instant in time. Constructed explicitly by callers — JSON input is
    /// never sniffed for date-looking strings.
    Date(DateTime<Utc>),
    Array(Vec<Json>),
    Object(Map<String, Json>),
}

impl FieldValue {
    /// The value type tag recorded alongside this value on write.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Number(_) => ValueType::Number,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Date(_) => ValueType::Date,
            Self::Array(_) => ValueType::Array,
            Self::Object(_) => ValueType::Object,
        }
    }

    /// Render as JSON. Dates become RFC 3339 strings.
    pub fn to_json(&self) -> Json {
        match self {
            Self::String(s) => Json::String(s.clone()),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Boolean(b) => Json::Bool(*b),
            Self::Date(d) => Json::String(d.to_rfc3339()),
            Self::Array(items) => Json::Array(items.clone()),
            Self::Object(map) => Json::Object(map.clone()),
        }
    }
}

impl TryFrom<Json> for FieldValue {
    type Error = CodecError;

    /// Convert a JSON value into a field value. JSON has no date type, so
    /// strings stay strings — [`FieldValue::Date`] is only ever constructed
    /// explicitly. Null is rejected rather than coerced.
    fn try_from(value: Json) -> Result<Self, CodecError> {
        match value {
            Json::Null => Err(CodecError::Unsupported("null")),
            Json::String(s) => Ok(Self::String(s)),
            Json::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or(CodecError::Unsupported("non-finite number")),
            Json::Bool(b) => Ok(Self::Boolean(b)),
            Json::Array(items) => Ok(Self::Array(items)),
            Json::Object(map) => Ok(Self::Object(map)),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        Self::try_from(json).map_err(serde::de::Error::custom)
    }
}

/// The six supported value types, stored as lowercase strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The store-neutral representation of a value: what a property graph can
/// hold natively. Dates have no variant here — they travel as tagged text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<StoredValue>),
    Map(BTreeMap<String, StoredValue>),
}

impl StoredValue {
    fn from_json(value: &Json) -> Result<Self, CodecError> {
        match value {
            Json::Null => Err(CodecError::Unsupported("null")),
            Json::String(s) => Ok(Self::Text(s.clone())),
            Json::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or(CodecError::Unsupported("non-finite number")),
            Json::Bool(b) => Ok(Self::Bool(*b)),
            Json::Array(items) => items.iter().map(Self::from_json).collect::<Result<_, _>>().map(Self::List),
            Json::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), Self::from_json(v)?)))
                .collect::<Result<_, CodecError>>()
                .map(Self::Map),
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Self::Text(s) => Json::String(s.clone()),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Bool(b) => Json::Bool(*b),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }

    /// The textual form used by substring search: text as-is, scalars via
    /// `to_string`, lists and maps as their canonical JSON rendering.
    pub fn search_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::List(_) | Self::Map(_) => crate::canon::canonical_json(&self.to_json()),
        }
    }
}

/// Encode a runtime value into its stored representation and type tag.
pub fn encode(value: &FieldValue) -> Result<(StoredValue, ValueType), CodecError> {
    let stored = match value {
        FieldValue::String(s) => StoredValue::Text(s.clone()),
        FieldValue::Number(n) => StoredValue::Number(*n),
        FieldValue::Boolean(b) => StoredValue::Bool(*b),
        FieldValue::Date(d) => StoredValue::Text(d.to_rfc3339()),
        FieldValue::Array(items) => StoredValue::List(
            items.iter().map(StoredValue::from_json).collect::<Result<_, _>>()?,
        ),
        FieldValue::Object(map) => StoredValue::Map(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), StoredValue::from_json(v)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
    };
    Ok((stored, value.value_type()))
}

/// Decode a stored representation back into the runtime value it was
/// written as, using the recorded type tag.
pub fn decode(stored: &StoredValue, value_type: ValueType) -> Result<FieldValue, CodecError> {
    match (stored, value_type) {
        (StoredValue::Text(s), ValueType::String) => Ok(FieldValue::String(s.clone())),
        (StoredValue::Number(n), ValueType::Number) => Ok(FieldValue::Number(*n)),
        (StoredValue::Bool(b), ValueType::Boolean) => Ok(FieldValue::Boolean(*b)),
        (StoredValue::Text(s), ValueType::Date) => DateTime::parse_from_rfc3339(s)
            .map(|d| FieldValue::Date(d.with_timezone(&Utc)))
            .map_err(|e| CodecError::InvalidDate(e.to_string())),
        (StoredValue::List(items), ValueType::Array) => {
            Ok(FieldValue::Array(items.iter().map(StoredValue::to_json).collect()))
        }
        (StoredValue::Map(map), ValueType::Object) => Ok(FieldValue::Object(
            map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
        )),
        _ => Err(CodecError::TypeMismatch { expected: value_type }),
    }
}
