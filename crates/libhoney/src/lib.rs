// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client library for batching and shipping telemetry events to a
//! Honeycomb-style ingest endpoint.
//!
//! Events are enqueued without blocking the producing thread (unless
//! configured to); a background pipeline samples, groups them by
//! destination, serializes, and POSTs them in batches, reporting one
//! [`Response`] per event back on a pull-style queue.
//!
//! ```no_run
//! use libhoney::{Client, ClientOptions};
//!
//! let options = ClientOptions {
//!     writekey: "your-write-key".to_string(),
//!     dataset: "your-dataset".to_string(),
//!     ..Default::default()
//! };
//! let client = Client::new(options).expect("valid configuration");
//!
//! let mut event = client.event();
//! event.add_field("latency_ms", 100);
//! event.add_field("endpoint", "/checkout");
//! client.send_event(event);
//!
//! client.close(true);
//! ```

pub mod builder;
pub mod cleaner;
pub mod client;
pub mod event;
pub mod null_transmission;
pub mod queueing;
pub mod response;
pub mod transmission;
pub mod value;

pub use builder::{Builder, DynamicField};
pub use client::{Client, ClientOptions, DEFAULT_API_HOST};
pub use event::Event;
pub use null_transmission::{LogTransmission, MockTransmission, NullTransmission};
pub use queueing::{QueueError, SizedQueueWithTimeout, Wait};
pub use response::Response;
pub use transmission::{
    ConfigError, ResponseQueue, Transmission, TransmissionClient, TransmissionError,
    TransmissionOptions,
};
pub use value::{Stringify, StringifyError, Value};
