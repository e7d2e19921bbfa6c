// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The caller-facing surface: a root builder for field composition, a
//! transmission choice, and the response queue consumers drain.

use crate::builder::{Builder, DynamicField};
use crate::event::Event;
use crate::queueing::Wait;
use crate::response::Response;
use crate::transmission::{
    ConfigError, ResponseQueue, Transmission, TransmissionClient, TransmissionOptions,
};
use crate::value::Value;
use rand::Rng;
use tracing::warn;

pub const DEFAULT_API_HOST: &str = "https://api.honeycomb.io/";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub writekey: String,
    pub dataset: String,
    /// Keep 1 in `sample_rate` events; 1 keeps everything.
    pub sample_rate: u32,
    pub api_host: String,
    pub transmission: TransmissionOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            writekey: String::new(),
            dataset: String::new(),
            sample_rate: 1,
            api_host: DEFAULT_API_HOST.to_string(),
            transmission: TransmissionOptions::default(),
        }
    }
}

/// Entry point for sending telemetry.
///
/// Creating a client starts no background work; threads spin up on the
/// first submitted event and are torn down by [`Client::close`].
pub struct Client {
    builder: Builder,
    transmission: Box<dyn Transmission>,
    block_on_responses: bool,
}

impl Client {
    pub fn new(options: ClientOptions) -> Result<Self, ConfigError> {
        let transmission = TransmissionClient::new(options.transmission.clone())?;
        Self::with_transmission(options, Box::new(transmission))
    }

    /// Builds a client around any [`Transmission`] implementation; the
    /// injection point used for the null, log, and mock variants.
    pub fn with_transmission(
        options: ClientOptions,
        transmission: Box<dyn Transmission>,
    ) -> Result<Self, ConfigError> {
        if options.sample_rate < 1 {
            return Err(ConfigError::InvalidConfig(
                "sample_rate must be greater than 0".to_string(),
            ));
        }
        options.transmission.validate()?;

        let builder = Builder::new(
            options.api_host,
            options.writekey,
            options.dataset,
            options.sample_rate,
        );
        Ok(Self {
            builder,
            transmission,
            block_on_responses: options.transmission.block_on_responses,
        })
    }

    /// Creates an event carrying the root builder's fields.
    pub fn event(&self) -> Event {
        self.builder.event()
    }

    /// Creates a child builder inheriting the root builder's fields.
    pub fn builder(&self) -> Builder {
        self.builder.builder()
    }

    // Narrow forwarding onto the root builder.

    pub fn writekey(&self) -> &str {
        &self.builder.writekey
    }

    pub fn set_writekey(&mut self, writekey: impl Into<String>) {
        self.builder.writekey = writekey.into();
    }

    pub fn dataset(&self) -> &str {
        &self.builder.dataset
    }

    pub fn set_dataset(&mut self, dataset: impl Into<String>) {
        self.builder.dataset = dataset.into();
    }

    pub fn api_host(&self) -> &str {
        &self.builder.api_host
    }

    pub fn set_api_host(&mut self, api_host: impl Into<String>) {
        self.builder.api_host = api_host.into();
    }

    pub fn sample_rate(&self) -> u32 {
        self.builder.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.builder.sample_rate = sample_rate;
    }

    /// Adds a static field to the root builder.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.builder.add_field(name, value);
        self
    }

    /// Adds a group of static fields to the root builder.
    pub fn add<I, K, V>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.builder.add(fields);
        self
    }

    /// Adds a dynamic field to the root builder.
    pub fn add_dynamic_field(&mut self, name: impl Into<String>, field: DynamicField) -> &mut Self {
        self.builder.add_dynamic_field(name, field);
        self
    }

    /// Creates, populates, and sends an event in one call.
    pub fn send_now<I, K, V>(&self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut event = self.event();
        event.add(fields);
        self.send_event(event);
    }

    /// Applies the sampling decision and hands the event to the
    /// transmission. Sampled-out and empty events are answered with a
    /// local response instead of reaching the engine.
    pub fn send_event(&self, event: Event) {
        if should_drop(event.sample_rate) {
            self.send_dropped_response(event, "event dropped due to sampling");
            return;
        }
        self.send_presampled(event);
    }

    /// Sends an event whose sampling decision was already made
    /// elsewhere.
    pub fn send_presampled(&self, event: Event) {
        if event.data.is_empty() {
            warn!("refusing to send event with no fields");
            self.send_dropped_response(event, "will not send empty event");
            return;
        }
        self.transmission.add(event);
    }

    /// The queue delivery outcomes arrive on. After a draining close,
    /// a `None` sentinel marks the end of the stream.
    pub fn responses(&self) -> ResponseQueue {
        self.transmission.responses()
    }

    /// Shuts the pipeline down. With `drain` set, queued and in-flight
    /// work finishes first; otherwise queued work is discarded and the
    /// number of discarded events is returned.
    pub fn close(&self, drain: bool) -> usize {
        self.transmission.close(drain)
    }

    /// Responses for events that never reach the engine honor the same
    /// full-queue policy the engine applies to its own responses.
    fn send_dropped_response(&self, event: Event, message: &str) {
        let wait = if self.block_on_responses {
            Wait::Forever
        } else {
            Wait::NoWait
        };
        let _ = self
            .transmission
            .responses()
            .push(Some(Response::local_error(message, event.metadata)), wait);
    }
}

fn should_drop(sample_rate: u32) -> bool {
    if sample_rate <= 1 {
        return false;
    }
    rand::thread_rng().gen_range(1..=sample_rate) != 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null_transmission::MockTransmission;
    use crate::queueing::Wait;
    use std::sync::Arc;

    fn mock_client(options: ClientOptions) -> (Client, Arc<MockTransmission>) {
        // The Arc lets assertions reach the same capture the client
        // feeds; MockTransmission's state lives behind its own locks.
        let mock = Arc::new(MockTransmission::with_status(202));
        let tx = Box::new(SharedMock(Arc::clone(&mock)));
        let client = Client::with_transmission(options, tx).expect("client should build");
        (client, mock)
    }

    struct SharedMock(Arc<MockTransmission>);

    impl Transmission for SharedMock {
        fn add(&self, event: Event) {
            self.0.add(event);
        }

        fn close(&self, drain: bool) -> usize {
            self.0.close(drain)
        }

        fn responses(&self) -> ResponseQueue {
            self.0.responses()
        }
    }

    fn test_options() -> ClientOptions {
        ClientOptions {
            writekey: "wk".to_string(),
            dataset: "ds".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        let options = ClientOptions {
            sample_rate: 0,
            ..test_options()
        };
        assert!(Client::new(options).is_err());
    }

    #[test]
    fn test_events_carry_global_fields() {
        let (mut client, mock) = mock_client(test_options());
        client.add_field("service", "billing");
        client.send_now([("status", 200)]);

        let events = mock.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].data.contains_key("service"));
        assert!(events[0].data.contains_key("status"));
        assert_eq!(events[0].writekey, "wk");
    }

    #[test]
    fn test_empty_event_is_answered_locally() {
        let (client, mock) = mock_client(test_options());
        client.send_event(client.event());

        assert!(mock.events().is_empty());
        let response = client
            .responses()
            .pop(Wait::NoWait)
            .expect("a response should be queued")
            .expect("response should not be the sentinel");
        assert_eq!(response.status_code, 0);
        assert!(response.error.expect("error should be set").contains("empty"));
    }

    #[test]
    fn test_sampling_synthesizes_dropped_responses() {
        let options = ClientOptions {
            sample_rate: 1_000_000,
            ..test_options()
        };
        let (client, mock) = mock_client(options);

        // With this sample rate nearly everything drops; every drop
        // must still be observable as a response, so accepted plus
        // dropped always adds up to what was submitted.
        let submitted: usize = 50;
        for i in 0..submitted {
            let mut event = client.event();
            event.add_field("i", i as i64);
            event.metadata = Some(serde_json::json!(i));
            client.send_event(event);
        }

        let responses = client.responses();
        let mut accepted = 0;
        let mut dropped = 0;
        while let Ok(Some(response)) = responses.pop(Wait::NoWait) {
            if response.status_code == 202 {
                accepted += 1;
            } else {
                dropped += 1;
                assert!(response
                    .error
                    .expect("dropped response should carry an error")
                    .contains("sampling"));
            }
        }
        assert_eq!(accepted, mock.events().len());
        assert_eq!(accepted + dropped, submitted);
    }

    #[test]
    fn test_dropped_response_blocks_when_configured() {
        use crate::queueing::SizedQueueWithTimeout;

        // A transmission that swallows events but shares a tiny response
        // queue, so a locally synthesized response meets backpressure.
        struct TinyResponses(ResponseQueue);

        impl Transmission for TinyResponses {
            fn add(&self, _event: Event) {}

            fn close(&self, _drain: bool) -> usize {
                0
            }

            fn responses(&self) -> ResponseQueue {
                Arc::clone(&self.0)
            }
        }

        let responses: ResponseQueue = Arc::new(SizedQueueWithTimeout::new(1));
        responses
            .push(Some(Response::local_error("filler", None)), Wait::NoWait)
            .expect("push failed");

        let options = ClientOptions {
            transmission: TransmissionOptions {
                block_on_responses: true,
                ..Default::default()
            },
            ..test_options()
        };
        let client = Client::with_transmission(
            options,
            Box::new(TinyResponses(Arc::clone(&responses))),
        )
        .expect("client should build");

        // The empty event's response must wait for space, not vanish.
        let client = Arc::new(client);
        let submitter = {
            let client = Arc::clone(&client);
            std::thread::spawn(move || client.send_event(client.event()))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(responses.is_full());

        let filler = responses
            .pop(Wait::NoWait)
            .expect("filler should be queued")
            .expect("filler should not be the sentinel");
        assert_eq!(filler.error.as_deref(), Some("filler"));

        submitter.join().expect("submitter panicked");
        let response = responses
            .pop(Wait::NoWait)
            .expect("dropped response should be queued")
            .expect("response should not be the sentinel");
        assert!(response.error.expect("error should be set").contains("empty"));
    }

    #[test]
    fn test_delegation_reaches_builder() {
        let (mut client, _mock) = mock_client(test_options());
        assert_eq!(client.writekey(), "wk");
        client.set_dataset("other");
        assert_eq!(client.dataset(), "other");
        client.set_sample_rate(4);
        assert_eq!(client.event().sample_rate, 4);
    }

    #[test]
    fn test_close_forwards_to_transmission() {
        let (client, _mock) = mock_client(test_options());
        assert_eq!(client.close(true), 0);
        // Terminal sentinel from the mock close.
        let responses = client.responses();
        let mut saw_sentinel = false;
        while let Ok(item) = responses.pop(Wait::NoWait) {
            if item.is_none() {
                saw_sentinel = true;
            }
        }
        assert!(saw_sentinel);
    }
}
