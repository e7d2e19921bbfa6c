// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The event record handed to the transmission engine.

use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Instant;

/// One telemetry point: a field map plus the coordinates and metadata
/// the engine needs to deliver it and report back.
///
/// The engine never mutates `data`; it only reads the destination
/// fields, the timestamp, the sample rate, and the metadata.
#[derive(Debug, Clone)]
pub struct Event {
    pub data: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub sample_rate: u32,
    pub api_host: String,
    pub writekey: String,
    pub dataset: String,
    /// Opaque caller value, copied verbatim onto the event's
    /// [`crate::Response`] for correlation.
    pub metadata: Option<serde_json::Value>,
}

impl Event {
    pub fn new(
        api_host: impl Into<String>,
        writekey: impl Into<String>,
        dataset: impl Into<String>,
        sample_rate: u32,
    ) -> Self {
        Self {
            data: BTreeMap::new(),
            timestamp: Utc::now(),
            sample_rate,
            api_host: api_host.into(),
            writekey: writekey.into(),
            dataset: dataset.into(),
            metadata: None,
        }
    }

    /// Adds a single field.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.data.insert(name.into(), value.into());
        self
    }

    /// Adds a group of fields.
    pub fn add<I, K, V>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in fields {
            self.data.insert(name.into(), value.into());
        }
        self
    }

    /// Times `work` and records its duration in milliseconds under
    /// `name`.
    pub fn with_timer<F, R>(&mut self, name: impl Into<String>, work: F) -> R
    where
        F: FnOnce() -> R,
    {
        let started = Instant::now();
        let result = work();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.add_field(name, elapsed_ms);
        result
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
