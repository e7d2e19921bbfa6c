// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Accumulates static and dynamically-computed fields and stamps them
//! onto every event it creates.

use crate::event::Event;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A field whose value is computed fresh for every event.
pub type DynamicField = Arc<dyn Fn() -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub struct Builder {
    pub api_host: String,
    pub writekey: String,
    pub dataset: String,
    pub sample_rate: u32,
    fields: BTreeMap<String, Value>,
    dyn_fields: Vec<(String, DynamicField)>,
}

impl Builder {
    pub fn new(
        api_host: impl Into<String>,
        writekey: impl Into<String>,
        dataset: impl Into<String>,
        sample_rate: u32,
    ) -> Self {
        Self {
            api_host: api_host.into(),
            writekey: writekey.into(),
            dataset: dataset.into(),
            sample_rate,
            fields: BTreeMap::new(),
            dyn_fields: Vec::new(),
        }
    }

    /// Adds a static field included on every event from this builder.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds a group of static fields.
    pub fn add<I, K, V>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in fields {
            self.fields.insert(name.into(), value.into());
        }
        self
    }

    /// Adds a field whose value is recomputed when each event is
    /// created.
    pub fn add_dynamic_field(&mut self, name: impl Into<String>, field: DynamicField) -> &mut Self {
        self.dyn_fields.push((name.into(), field));
        self
    }

    /// Creates an event carrying a snapshot of the static fields plus
    /// the current value of every dynamic field.
    pub fn event(&self) -> Event {
        let mut event = Event::new(
            self.api_host.clone(),
            self.writekey.clone(),
            self.dataset.clone(),
            self.sample_rate,
        );
        event.data = self.fields.clone();
        for (name, field) in &self.dyn_fields {
            event.data.insert(name.clone(), field());
        }
        event
    }

    /// Creates a child builder inheriting this builder's destination and
    /// fields.
    pub fn builder(&self) -> Builder {
        self.clone()
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("api_host", &self.api_host)
            .field("dataset", &self.dataset)
            .field("sample_rate", &self.sample_rate)
            .field("fields", &self.fields)
            .field("dyn_fields", &self.dyn_fields.len())
            .finish()
    }
}
