// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Field values attached to events.
//!
//! Most callers only ever use plain scalars and containers, but two
//! extra variants carry the awkward cases telemetry data shows up in:
//! [`Value::Shared`] for aliased (possibly cyclic) containers and
//! [`Value::Opaque`] for arbitrary values that are coerced to text at
//! send time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A value that could not be coerced into a transmittable form.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to stringify field value: {0}")]
pub struct StringifyError(pub String);

/// Send-time textual coercion for values the wire format has no native
/// representation for.
pub trait Stringify: Send + Sync {
    fn stringify(&self) -> Result<String, StringifyError>;
}

/// One field value on an event.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// An aliasable container cell. Distinct fields may point at the
    /// same cell, and cells may form reference cycles; the cleaner
    /// breaks those by identity (see [`crate::cleaner`]).
    Shared(Arc<Mutex<Value>>),
    /// An arbitrary caller value, stringified at send time.
    Opaque(Arc<dyn Stringify>),
}

impl Value {
    /// Wraps a value in a fresh shared cell and returns both the cell
    /// handle (for further aliasing or mutation) and the `Value`.
    pub fn shared(value: Value) -> (Arc<Mutex<Value>>, Value) {
        let cell = Arc::new(Mutex::new(value));
        (Arc::clone(&cell), Value::Shared(cell))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::String(v) => f.debug_tuple("String").field(v).finish(),
            Value::Array(v) => f.debug_tuple("Array").field(v).finish(),
            Value::Object(v) => f.debug_tuple("Object").field(v).finish(),
            Value::Shared(_) => write!(f, "Shared(..)"),
            Value::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(values: Vec<V>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<Arc<Mutex<Value>>> for Value {
    fn from(cell: Arc<Mutex<Value>>) -> Self {
        Value::Shared(cell)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(v),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(values) => {
                Value::Array(values.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}
