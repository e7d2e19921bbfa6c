// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Normalizes event field values into transmittable JSON.
//!
//! Cleaning never fails and never panics. Shared containers are walked
//! with an identity-keyed `seen` map so a cell revisited mid-walk (a
//! reference cycle) is replaced by [`RECURSION_MARKER`], while a cell
//! revisited after its walk finished reuses its already-cleaned form.
//! A value whose textual coercion fails is replaced by
//! [`RAISED_MARKER`], and the first such failure is reported alongside
//! the cleaned data so the sender can decide that event's fate.

use crate::value::{StringifyError, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const RECURSION_MARKER: &str = "[RECURSION]";
pub const RAISED_MARKER: &str = "[RAISED]";

/// The outcome of cleaning: always-complete data, plus the first
/// coercion failure encountered, if any.
#[derive(Debug)]
pub struct Cleaned {
    pub data: serde_json::Value,
    pub failure: Option<StringifyError>,
}

/// Cleans a single value.
pub fn clean(value: &Value) -> Cleaned {
    let mut walk = Walk::default();
    let data = walk.clean_value(value);
    Cleaned {
        data,
        failure: walk.failure,
    }
}

/// Cleans a whole field map under one `seen` scope, so cells aliased
/// across fields resolve consistently.
pub fn clean_fields(fields: &BTreeMap<String, Value>) -> Cleaned {
    let mut walk = Walk::default();
    let mut data = serde_json::Map::with_capacity(fields.len());
    for (name, value) in fields {
        data.insert(name.clone(), walk.clean_value(value));
    }
    Cleaned {
        data: serde_json::Value::Object(data),
        failure: walk.failure,
    }
}

#[derive(Default)]
struct Walk {
    // Keyed by cell address; holds the recursion marker while a cell is
    // being walked and the cleaned result afterwards.
    seen: HashMap<usize, serde_json::Value>,
    failure: Option<StringifyError>,
}

impl Walk {
    fn clean_value(&mut self, value: &Value) -> serde_json::Value {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            // Non-finite floats have no JSON form; they degrade to null
            // rather than counting as a coercion failure.
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(v) => serde_json::Value::String(v.clone()),
            Value::Array(items) => serde_json::Value::Array(
                items.iter().map(|item| self.clean_value(item)).collect(),
            ),
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(name, field)| (name.clone(), self.clean_value(field)))
                    .collect(),
            ),
            Value::Shared(cell) => self.clean_shared(cell),
            Value::Opaque(opaque) => match opaque.stringify() {
                Ok(text) => serde_json::Value::String(text),
                Err(error) => {
                    if self.failure.is_none() {
                        self.failure = Some(error);
                    }
                    serde_json::Value::String(RAISED_MARKER.to_string())
                }
            },
        }
    }

    fn clean_shared(&mut self, cell: &Arc<Mutex<Value>>) -> serde_json::Value {
        let key = Arc::as_ptr(cell) as usize;
        if let Some(previous) = self.seen.get(&key) {
            return previous.clone();
        }

        self.seen
            .insert(key, serde_json::Value::String(RECURSION_MARKER.to_string()));
        let inner = cell
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let cleaned = self.clean_value(&inner);
        self.seen.insert(key, cleaned.clone());
        cleaned
    }
}
