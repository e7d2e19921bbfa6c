// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transmission variants that bypass the network: a silent discard, a
//! log-only variant, and an in-memory capture for tests.

use crate::event::Event;
use crate::queueing::SizedQueueWithTimeout;
use crate::response::Response;
use crate::transmission::{enqueue_terminal_sentinel, ResponseQueue, Transmission};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Silently drops every event.
pub struct NullTransmission {
    responses: ResponseQueue,
}

impl NullTransmission {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(SizedQueueWithTimeout::new(1)),
        }
    }
}

impl Default for NullTransmission {
    fn default() -> Self {
        Self::new()
    }
}

impl Transmission for NullTransmission {
    fn add(&self, _event: Event) {}

    fn close(&self, _drain: bool) -> usize {
        0
    }

    fn responses(&self) -> ResponseQueue {
        Arc::clone(&self.responses)
    }
}

/// Logs each event's serialized fields instead of sending them.
/// Useful when wiring up instrumentation before a write key exists.
pub struct LogTransmission {
    responses: ResponseQueue,
}

impl LogTransmission {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(SizedQueueWithTimeout::new(1)),
        }
    }
}

impl Default for LogTransmission {
    fn default() -> Self {
        Self::new()
    }
}

impl Transmission for LogTransmission {
    fn add(&self, event: Event) {
        let cleaned = crate::cleaner::clean_fields(&event.data);
        info!(
            dataset = %event.dataset,
            "event: {}",
            cleaned.data
        );
    }

    fn close(&self, _drain: bool) -> usize {
        0
    }

    fn responses(&self) -> ResponseQueue {
        Arc::clone(&self.responses)
    }
}

/// Captures events in memory and answers each with a canned response,
/// so callers can assert on what their instrumentation produced.
pub struct MockTransmission {
    events: Mutex<Vec<Event>>,
    responses: ResponseQueue,
    stub_status: u16,
}

impl MockTransmission {
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Answers every captured event with `status` on the response
    /// queue.
    pub fn with_status(status: u16) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            responses: Arc::new(SizedQueueWithTimeout::new(2000)),
            stub_status: status,
        }
    }

    /// The events captured so far, in submission order.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MockTransmission {
    fn default() -> Self {
        Self::new()
    }
}

impl Transmission for MockTransmission {
    fn add(&self, event: Event) {
        let response = Response {
            status_code: self.stub_status,
            duration: Duration::ZERO,
            metadata: event.metadata.clone(),
            error: None,
        };
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        let _ = self
            .responses
            .push(Some(response), crate::queueing::Wait::NoWait);
    }

    fn close(&self, _drain: bool) -> usize {
        enqueue_terminal_sentinel(&self.responses);
        0
    }

    fn responses(&self) -> ResponseQueue {
        Arc::clone(&self.responses)
    }
}
