//! Value model for shared state entries
//!
//! [`Value`] is the closed tagged union carried by every entry. On the wire
//! it travels as `google.protobuf.Value`; typed records cross into it through
//! serde ([`to_value`] / [`from_value`]).
//!
//! [`StateChanges`] is one batch of upserts and removals. A removal is the
//! `null` sentinel on the wire and `None` here.

mod changes;
pub use changes::*;

use std::collections::BTreeMap;

use prost_types::value::Kind;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ValueError;

/// Closed tagged union of everything that can be stored under a key.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(fields) => Some(fields),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Value::Map(fields)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

//-----------------------------------------------------------
// Wire conversion (google.protobuf.Value / Struct)

impl From<prost_types::Value> for Value {
    fn from(value: prost_types::Value) -> Self {
        match value.kind {
            None | Some(Kind::NullValue(_)) => Value::Null,
            Some(Kind::BoolValue(b)) => Value::Bool(b),
            Some(Kind::NumberValue(n)) => Value::Number(n),
            Some(Kind::StringValue(s)) => Value::String(s),
            Some(Kind::ListValue(list)) => Value::List(list.values.into_iter().map(Value::from).collect()),
            Some(Kind::StructValue(s)) => Value::from(s),
        }
    }
}

impl From<prost_types::Struct> for Value {
    fn from(s: prost_types::Struct) -> Self {
        Value::Map(s.fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
    }
}

impl From<Value> for prost_types::Value {
    fn from(value: Value) -> Self {
        let kind = match value {
            Value::Null => Kind::NullValue(prost_types::NullValue::NullValue as i32),
            Value::Bool(b) => Kind::BoolValue(b),
            Value::Number(n) => Kind::NumberValue(n),
            Value::String(s) => Kind::StringValue(s),
            Value::List(items) => Kind::ListValue(prost_types::ListValue {
                values: items.into_iter().map(prost_types::Value::from).collect(),
            }),
            Value::Map(fields) => Kind::StructValue(map_to_struct(fields)),
        };
        prost_types::Value { kind: Some(kind) }
    }
}

pub(crate) fn map_to_struct(fields: BTreeMap<String, Value>) -> prost_types::Struct {
    prost_types::Struct {
        fields: fields
            .into_iter()
            .map(|(k, v)| (k, prost_types::Value::from(v)))
            .collect(),
    }
}

pub(crate) fn null_proto_value() -> prost_types::Value {
    prost_types::Value::from(Value::Null)
}

//-----------------------------------------------------------
// Serde bridge

/// Converts a typed record into a [`Value`].
pub fn to_value<T>(item: &T) -> Result<Value, ValueError>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_value(item)?;
    Ok(Value::from(json))
}

/// Converts a [`Value`] back into a typed record.
pub fn from_value<T>(value: &Value) -> Result<T, ValueError>
where
    T: DeserializeOwned,
{
    let json = serde_json::Value::try_from(value.clone())?;
    Ok(serde_json::from_value(json)?)
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(fields) => {
                Value::Map(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl TryFrom<Value> for serde_json::Value {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(json_number(n)?),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => serde_json::Value::Array(
                items
                    .into_iter()
                    .map(serde_json::Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| Ok((k, serde_json::Value::try_from(v)?)))
                    .collect::<Result<_, ValueError>>()?,
            ),
        })
    }
}

/// Whole numbers become integers so integer fields deserialize cleanly.
fn json_number(n: f64) -> Result<serde_json::Number, ValueError> {
    if !n.is_finite() {
        return Err(ValueError::NonFiniteNumber(n));
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        if n >= 0.0 {
            return Ok(serde_json::Number::from(n as u64));
        }
        return Ok(serde_json::Number::from(n as i64));
    }
    serde_json::Number::from_f64(n).ok_or(ValueError::NonFiniteNumber(n))
}
