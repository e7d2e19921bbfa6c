// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The asynchronous batching-and-transmission engine.
//!
//! Events accepted by [`TransmissionClient::add`] flow through a bounded
//! intake queue into a single batching thread, which groups them by
//! destination and hands right-sized batches to a demand-grown pool of
//! sender threads. Senders serialize, POST, and correlate the per-event
//! results back onto the response queue. Nothing in this pipeline ever
//! raises into the submitting thread; every failure terminates as a
//! [`Response`] value.

use crate::cleaner;
use crate::event::Event;
use crate::queueing::{SizedQueueWithTimeout, Wait};
use crate::response::Response;
use crate::value::StringifyError;
use chrono::SecondsFormat;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

/// The queue callers consume delivery outcomes from. A `None` item is
/// the terminal sentinel pushed exactly once at full shutdown.
pub type ResponseQueue = Arc<SizedQueueWithTimeout<Option<Response>>>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    #[error("invalid api host ({0})")]
    InvalidApiHost(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("failed to serialize event fields: {0}")]
    Stringify(#[from] StringifyError),

    #[error("failed to encode batch payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Tuning knobs for the engine; the defaults match the documented
/// behavior of the hosted ingest API.
#[derive(Debug, Clone)]
pub struct TransmissionOptions {
    /// Maximum events per outgoing request.
    pub max_batch_size: usize,
    /// How often accumulated events are flushed into batches.
    pub send_frequency: Duration,
    /// Cap on concurrently live sender threads.
    pub max_concurrent_batches: usize,
    /// Capacity of the intake and work queues.
    pub pending_work_capacity: usize,
    /// Per-call network timeout.
    pub send_timeout: Duration,
    /// Block the submitting thread when the intake queue is full,
    /// instead of dropping the event.
    pub block_on_send: bool,
    /// Block pipeline threads when the response queue is full, instead
    /// of dropping the response.
    pub block_on_responses: bool,
    /// Appended to the `libhoney-rs/{version}` user agent.
    pub user_agent_addition: Option<String>,
    /// Upstream proxy URL for all outgoing requests.
    pub proxy: Option<String>,
}

impl Default for TransmissionOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            send_frequency: Duration::from_millis(100),
            max_concurrent_batches: 10,
            pending_work_capacity: 1000,
            send_timeout: Duration::from_secs(10),
            block_on_send: false,
            block_on_responses: false,
            user_agent_addition: None,
            proxy: None,
        }
    }
}

impl TransmissionOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_batches == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_concurrent_batches must be greater than 0".to_string(),
            ));
        }
        if self.pending_work_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "pending_work_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// The capability the rest of the library programs against: accept one
/// finished event, and shut down with or without draining queued work.
pub trait Transmission: Send + Sync {
    fn add(&self, event: Event);

    /// Closes the transmission, returning the number of queued events
    /// discarded (always 0 when draining).
    fn close(&self, drain: bool) -> usize;

    fn responses(&self) -> ResponseQueue;
}

/// Where a batch goes: endpoint, auth, and logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Destination {
    api_host: String,
    writekey: String,
    dataset: String,
}

impl Destination {
    fn of(event: &Event) -> Self {
        Self {
            api_host: event.api_host.clone(),
            writekey: event.writekey.clone(),
            dataset: event.dataset.clone(),
        }
    }
}

/// One unit of work for a sender thread.
struct SendUnit {
    destination: Destination,
    events: Vec<Event>,
}

#[derive(Default)]
struct Workers {
    batcher: Option<JoinHandle<()>>,
    senders: Vec<JoinHandle<()>>,
}

/// The real engine. Threads are spawned lazily on demand and unwound by
/// in-band `None` sentinels at close.
pub struct TransmissionClient {
    opts: TransmissionOptions,
    user_agent: String,
    batch_queue: Arc<SizedQueueWithTimeout<Option<Event>>>,
    send_queue: Arc<SizedQueueWithTimeout<Option<SendUnit>>>,
    responses: ResponseQueue,
    workers: Mutex<Workers>,
    closing: AtomicBool,
}

impl TransmissionClient {
    pub fn new(opts: TransmissionOptions) -> Result<Self, ConfigError> {
        opts.validate()?;
        let responses = Arc::new(SizedQueueWithTimeout::new(opts.pending_work_capacity * 2));
        Ok(Self::with_responses(opts, responses))
    }

    /// Builds an engine pushing onto a caller-supplied response queue.
    pub fn with_responses(opts: TransmissionOptions, responses: ResponseQueue) -> Self {
        let user_agent = build_user_agent(opts.user_agent_addition.as_deref());
        Self {
            batch_queue: Arc::new(SizedQueueWithTimeout::new(opts.pending_work_capacity)),
            send_queue: Arc::new(SizedQueueWithTimeout::new(opts.pending_work_capacity)),
            responses,
            workers: Mutex::new(Workers::default()),
            closing: AtomicBool::new(false),
            user_agent,
            opts,
        }
    }

    pub fn add(&self, event: Event) {
        // Events can be submitted from within a send (stringifying a
        // field may itself emit telemetry). Once close has begun they
        // are declined outright, so a closing pipeline can never be
        // re-entered or resurrected.
        if self.closing.load(Ordering::SeqCst) {
            debug!("transmission is closing; dropping event for {}", event.dataset);
            return;
        }
        if !self.event_valid(&event) {
            return;
        }

        let wait = if self.opts.block_on_send {
            Wait::Forever
        } else {
            Wait::NoWait
        };
        if self.batch_queue.push(Some(event), wait).is_err() {
            debug!("batch queue full; dropping event");
        }

        self.ensure_threads_running();
    }

    pub fn close(&self, drain: bool) -> usize {
        let already_closing = self.closing.swap(true, Ordering::SeqCst);

        let mut discarded = 0;
        if !drain {
            discarded += self.batch_queue.clear().into_iter().flatten().count();
            discarded += self
                .send_queue
                .clear()
                .into_iter()
                .flatten()
                .map(|unit| unit.events.len())
                .sum::<usize>();
        }

        let (batcher, senders) = {
            let mut workers = self.lock_workers();
            (workers.batcher.take(), std::mem::take(&mut workers.senders))
        };

        if let Some(handle) = batcher {
            // The batcher keeps draining intake until it pops this
            // sentinel, so a blocking push cannot wedge here.
            let _ = self.batch_queue.push(None, Wait::Forever);
            if handle.join().is_err() {
                error!("batch thread panicked during close");
            }
        }

        // One sentinel per sender still running; finished threads no
        // longer consume from the queue.
        let live_senders = senders.iter().filter(|handle| !handle.is_finished()).count();
        for _ in 0..live_senders {
            let _ = self.send_queue.push(None, Wait::Forever);
        }
        for handle in senders {
            if handle.join().is_err() {
                error!("sender thread panicked during close");
            }
        }

        if !already_closing {
            enqueue_response(&self.responses, self.opts.block_on_responses, None);
        }

        discarded
    }

    pub fn responses(&self) -> ResponseQueue {
        Arc::clone(&self.responses)
    }

    /// Destination coordinates must all be present for an event to be
    /// eligible; anything else is answered locally, before any queue or
    /// network is involved.
    fn event_valid(&self, event: &Event) -> bool {
        let mut missing = Vec::new();
        if event.api_host.is_empty() {
            missing.push("api host");
        }
        if event.writekey.is_empty() {
            missing.push("write key");
        }
        if event.dataset.is_empty() {
            missing.push("dataset");
        }
        if missing.is_empty() {
            return true;
        }

        let response = Response::local_error(
            format!(
                "missing or empty required fields ({}); will not attempt to send",
                missing.join(", ")
            ),
            event.metadata.clone(),
        );
        enqueue_response(&self.responses, self.opts.block_on_responses, Some(response));
        false
    }

    /// Respawns the batcher if it exited, prunes finished senders, and
    /// tops the pool back up to the cap. The check-then-spawn sequence
    /// runs under one lock so the pool can never overshoot.
    fn ensure_threads_running(&self) {
        let mut workers = self.lock_workers();

        // Close swaps the closing flag before it touches this lock, so
        // a submission that raced past the flag check in `add` must
        // re-check here or it would respawn threads whose handles close
        // has already taken, leaving them without sentinels.
        if self.closing.load(Ordering::SeqCst) {
            return;
        }

        let batcher_alive = workers
            .batcher
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if !batcher_alive {
            let batcher = Batcher {
                batch_queue: Arc::clone(&self.batch_queue),
                send_queue: Arc::clone(&self.send_queue),
                send_frequency: self.opts.send_frequency,
                max_batch_size: self.opts.max_batch_size,
            };
            match thread::Builder::new()
                .name("libhoney-batch".to_string())
                .spawn(move || batcher.run())
            {
                Ok(handle) => workers.batcher = Some(handle),
                Err(err) => error!("failed to spawn batch thread: {err}"),
            }
        }

        workers.senders.retain(|handle| !handle.is_finished());
        while workers.senders.len() < self.opts.max_concurrent_batches {
            let sender = Sender {
                send_queue: Arc::clone(&self.send_queue),
                responses: Arc::clone(&self.responses),
                block_on_responses: self.opts.block_on_responses,
                send_timeout: self.opts.send_timeout,
                proxy: self.opts.proxy.clone(),
                user_agent: self.user_agent.clone(),
            };
            match thread::Builder::new()
                .name("libhoney-send".to_string())
                .spawn(move || sender.run())
            {
                Ok(handle) => workers.senders.push(handle),
                Err(err) => {
                    error!("failed to spawn sender thread: {err}");
                    break;
                }
            }
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Workers> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transmission for TransmissionClient {
    fn add(&self, event: Event) {
        TransmissionClient::add(self, event);
    }

    fn close(&self, drain: bool) -> usize {
        TransmissionClient::close(self, drain)
    }

    fn responses(&self) -> ResponseQueue {
        TransmissionClient::responses(self)
    }
}

impl Drop for TransmissionClient {
    fn drop(&mut self) {
        if !self.closing.load(Ordering::SeqCst) {
            self.close(false);
        }
    }
}

/// The single batching stage: drains intake, groups by destination, and
/// flushes on a time/size cadence.
struct Batcher {
    batch_queue: Arc<SizedQueueWithTimeout<Option<Event>>>,
    send_queue: Arc<SizedQueueWithTimeout<Option<SendUnit>>>,
    send_frequency: Duration,
    max_batch_size: usize,
}

impl Batcher {
    fn run(self) {
        let mut batched: HashMap<Destination, Vec<Event>> = HashMap::new();
        let mut next_send_time = Instant::now() + self.send_frequency;

        loop {
            match self.batch_queue.pop(Wait::For(self.send_frequency)) {
                Ok(Some(event)) => {
                    batched.entry(Destination::of(&event)).or_default().push(event);
                }
                Ok(None) => break,
                Err(_timed_out) => {}
            }

            if Instant::now() >= next_send_time {
                self.flush(&mut batched);
                next_send_time = Instant::now() + self.send_frequency;
            }
        }

        // Sentinel observed: one final flush of whatever accumulated.
        self.flush(&mut batched);
        debug!("batch thread exiting");
    }

    /// Slices each destination's accumulated events into batches no
    /// larger than `max_batch_size`, preserving arrival order, and
    /// hands them to the sender pool.
    fn flush(&self, batched: &mut HashMap<Destination, Vec<Event>>) {
        for (destination, mut events) in batched.drain() {
            while !events.is_empty() {
                let rest = if events.len() > self.max_batch_size {
                    events.split_off(self.max_batch_size)
                } else {
                    Vec::new()
                };
                let unit = SendUnit {
                    destination: destination.clone(),
                    events,
                };
                // Forever cannot time out; purge wakes this push by
                // clearing the queue.
                let _ = self.send_queue.push(Some(unit), Wait::Forever);
                events = rest;
            }
        }
    }
}

/// One sender-pool worker. Lives until it pops the shutdown sentinel;
/// every send failure is converted into responses, never a dead thread.
struct Sender {
    send_queue: Arc<SizedQueueWithTimeout<Option<SendUnit>>>,
    responses: ResponseQueue,
    block_on_responses: bool,
    send_timeout: Duration,
    proxy: Option<String>,
    user_agent: String,
}

impl Sender {
    fn run(self) {
        // One handle cache per worker lifetime, rebuilt on every
        // spin-up, keyed by endpoint so persistent connections get
        // reused across batches.
        let mut clients: HashMap<String, reqwest::blocking::Client> = HashMap::new();

        loop {
            match self.send_queue.pop(Wait::Forever) {
                Ok(Some(unit)) => self.send_batch(&mut clients, unit),
                Ok(None) | Err(_) => break,
            }
        }
        debug!("sender thread exiting");
    }

    fn send_batch(
        &self,
        clients: &mut HashMap<String, reqwest::blocking::Client>,
        unit: SendUnit,
    ) {
        let started = Instant::now();
        let (body, sent) = self.serialize_batch(unit.events);
        if sent.is_empty() {
            return;
        }

        let result = self.post(clients, &unit.destination, body);
        let duration = started.elapsed();

        match result {
            Ok(response) => self.fan_out(response, duration, &sent),
            Err(error) => {
                warn!(
                    "failed to send batch of {} to {}: {error}",
                    sent.len(),
                    unit.destination.api_host
                );
                let message = error.to_string();
                for event in &sent {
                    self.enqueue(Some(Response {
                        status_code: 0,
                        duration,
                        metadata: event.metadata.clone(),
                        error: Some(message.clone()),
                    }));
                }
            }
        }
    }

    /// Serializes each event independently. An event that fails gets an
    /// immediate local-error response and is excluded; its batch mates
    /// still go out.
    fn serialize_batch(&self, events: Vec<Event>) -> (String, Vec<Event>) {
        let mut payload = Vec::with_capacity(events.len());
        let mut sent = Vec::with_capacity(events.len());

        for event in events {
            match serialize_event(&event) {
                Ok(encoded) => {
                    payload.push(encoded);
                    sent.push(event);
                }
                Err(error) => {
                    debug!("excluding unserializable event from batch: {error}");
                    self.enqueue(Some(Response::local_error(
                        error.to_string(),
                        event.metadata.clone(),
                    )));
                }
            }
        }

        (format!("[{}]", payload.join(",")), sent)
    }

    fn post(
        &self,
        clients: &mut HashMap<String, reqwest::blocking::Client>,
        destination: &Destination,
        body: String,
    ) -> Result<reqwest::blocking::Response, TransmissionError> {
        let url = batch_url(&destination.api_host, &destination.dataset)?;
        let client = match clients.entry(destination.api_host.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.build_client()?),
        };

        Ok(client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Honeycomb-Team", &destination.writekey)
            .body(body)
            .send()?)
    }

    fn build_client(&self) -> Result<reqwest::blocking::Client, TransmissionError> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(self.send_timeout)
            .connect_timeout(self.send_timeout)
            .user_agent(self.user_agent.clone());
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(builder.build()?)
    }

    /// Turns one HTTP response into one [`Response`] per sent event.
    /// 2xx bodies carry a per-event status array positionally aligned
    /// with the request; anything else carries a single error applied
    /// to every event.
    fn fan_out(&self, response: reqwest::blocking::Response, duration: Duration, sent: &[Event]) {
        let status = response.status();

        if status.is_success() {
            let statuses: Vec<EventStatus> = match response.json() {
                Ok(statuses) => statuses,
                Err(error) => {
                    let message = format!("failed to parse batch response: {error}");
                    warn!("{message}");
                    for event in sent {
                        self.enqueue(Some(Response {
                            status_code: 0,
                            duration,
                            metadata: event.metadata.clone(),
                            error: Some(message.clone()),
                        }));
                    }
                    return;
                }
            };

            if statuses.len() < sent.len() {
                warn!(
                    "batch response carried {} statuses for {} events",
                    statuses.len(),
                    sent.len()
                );
            }
            for (index, event) in sent.iter().enumerate() {
                self.enqueue(Some(match statuses.get(index) {
                    Some(entry) => Response {
                        status_code: entry.status,
                        duration,
                        metadata: event.metadata.clone(),
                        error: None,
                    },
                    None => Response {
                        status_code: 0,
                        duration,
                        metadata: event.metadata.clone(),
                        error: Some("no status returned for event".to_string()),
                    },
                }));
            }
        } else {
            let code = status.as_u16();
            let message = response
                .json::<ErrorBody>()
                .map(|body| body.error)
                .unwrap_or_else(|_| format!("unexpected response status {status}"));
            warn!("error sending batch: {code} {message}");
            for event in sent {
                self.enqueue(Some(Response {
                    status_code: code,
                    duration,
                    metadata: event.metadata.clone(),
                    error: Some(message.clone()),
                }));
            }
        }
    }

    fn enqueue(&self, response: Option<Response>) {
        enqueue_response(&self.responses, self.block_on_responses, response);
    }
}

#[derive(Serialize)]
struct WireEvent {
    time: String,
    samplerate: u32,
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct EventStatus {
    #[serde(default)]
    status: u16,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn serialize_event(event: &Event) -> Result<String, TransmissionError> {
    let cleaned = cleaner::clean_fields(&event.data);
    if let Some(failure) = cleaned.failure {
        return Err(TransmissionError::Stringify(failure));
    }

    let wire = WireEvent {
        time: event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        samplerate: event.sample_rate,
        data: cleaned.data,
    };
    Ok(serde_json::to_string(&wire)?)
}

fn batch_url(api_host: &str, dataset: &str) -> Result<Url, TransmissionError> {
    let mut url = Url::parse(api_host)
        .map_err(|err| TransmissionError::InvalidApiHost(format!("{api_host}: {err}")))?;
    url.path_segments_mut()
        .map_err(|_| TransmissionError::InvalidApiHost(format!("{api_host}: cannot be a base")))?
        .pop_if_empty()
        .extend(["1", "batch", dataset]);
    Ok(url)
}

fn build_user_agent(addition: Option<&str>) -> String {
    let mut user_agent = format!("libhoney-rs/{}", env!("CARGO_PKG_VERSION"));
    if let Some(addition) = addition {
        user_agent.push(' ');
        user_agent.push_str(addition);
    }
    user_agent
}

/// Pushes the end-of-responses marker without blocking.
pub(crate) fn enqueue_terminal_sentinel(responses: &ResponseQueue) {
    enqueue_response(responses, false, None);
}

fn enqueue_response(responses: &ResponseQueue, block_on_responses: bool, response: Option<Response>) {
    let wait = if block_on_responses {
        Wait::Forever
    } else {
        Wait::NoWait
    };
    if responses.push(response, wait).is_err() {
        debug!("response queue full; dropping response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Stringify, Value};

    struct Exploding;

    impl Stringify for Exploding {
        fn stringify(&self) -> Result<String, StringifyError> {
            Err(StringifyError("boom".to_string()))
        }
    }

    fn test_event(dataset: &str) -> Event {
        let mut event = Event::new("https://api.honeycomb.io/", "wk", dataset, 1);
        event.add_field("hello", "world");
        event
    }

    fn test_sender(capacity: usize) -> Sender {
        Sender {
            send_queue: Arc::new(SizedQueueWithTimeout::new(capacity)),
            responses: Arc::new(SizedQueueWithTimeout::new(capacity)),
            block_on_responses: false,
            send_timeout: Duration::from_secs(1),
            proxy: None,
            user_agent: build_user_agent(None),
        }
    }

    #[test]
    fn test_options_defaults() {
        let opts = TransmissionOptions::default();
        assert_eq!(opts.max_batch_size, 50);
        assert_eq!(opts.send_frequency, Duration::from_millis(100));
        assert_eq!(opts.max_concurrent_batches, 10);
        assert_eq!(opts.pending_work_capacity, 1000);
        assert_eq!(opts.send_timeout, Duration::from_secs(10));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_options_validation() {
        for opts in [
            TransmissionOptions {
                max_batch_size: 0,
                ..Default::default()
            },
            TransmissionOptions {
                max_concurrent_batches: 0,
                ..Default::default()
            },
            TransmissionOptions {
                pending_work_capacity: 0,
                ..Default::default()
            },
        ] {
            assert!(opts.validate().is_err());
            assert!(TransmissionClient::new(opts).is_err());
        }
    }

    #[test]
    fn test_user_agent() {
        let plain = build_user_agent(None);
        assert!(plain.starts_with("libhoney-rs/"));
        let extended = build_user_agent(Some("beeline/1.0"));
        assert!(extended.ends_with(" beeline/1.0"));
    }

    #[test]
    fn test_batch_url_escapes_dataset() {
        let url = batch_url("https://api.honeycomb.io/", "my dataset").expect("url should build");
        assert_eq!(url.as_str(), "https://api.honeycomb.io/1/batch/my%20dataset");

        let url = batch_url("http://localhost:8080", "plain").expect("url should build");
        assert_eq!(url.as_str(), "http://localhost:8080/1/batch/plain");
    }

    #[test]
    fn test_batch_url_rejects_garbage() {
        assert!(batch_url("not a url", "ds").is_err());
    }

    #[test]
    fn test_serialize_event_wire_shape() {
        let encoded = serialize_event(&test_event("ds")).expect("serialization should succeed");
        let parsed: serde_json::Value =
            serde_json::from_str(&encoded).expect("wire event should be valid json");
        assert_eq!(parsed["samplerate"], 1);
        assert_eq!(parsed["data"]["hello"], "world");
        let time = parsed["time"].as_str().expect("time should be a string");
        assert!(time.contains('T') && time.ends_with('Z'));
        // RFC3339 with milliseconds: 2026-01-02T03:04:05.678Z
        assert!(time.contains('.'));
    }

    #[test]
    fn test_serialize_event_fails_on_bad_field() {
        let mut event = test_event("ds");
        event.add_field("bad", Value::Opaque(Arc::new(Exploding)));
        let error = serialize_event(&event).expect_err("serialization should fail");
        assert!(error.to_string().contains("boom"));
    }

    #[test]
    fn test_serialize_batch_isolates_bad_event() {
        let sender = test_sender(8);
        let mut bad = test_event("ds");
        bad.add_field("bad", Value::Opaque(Arc::new(Exploding)));
        bad.metadata = Some(serde_json::json!("the-bad-one"));

        let (body, sent) =
            sender.serialize_batch(vec![test_event("ds"), bad, test_event("ds")]);
        assert_eq!(sent.len(), 2);
        let parsed: serde_json::Value =
            serde_json::from_str(&body).expect("batch body should be valid json");
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));

        let response = sender
            .responses
            .pop(Wait::NoWait)
            .expect("a response should be queued")
            .expect("response should not be the sentinel");
        assert_eq!(response.status_code, 0);
        assert_eq!(response.metadata, Some(serde_json::json!("the-bad-one")));
        assert!(response.error.is_some());
        assert!(sender.responses.is_empty());
    }

    #[test]
    fn test_batcher_flush_slices_in_order() {
        let batcher = Batcher {
            batch_queue: Arc::new(SizedQueueWithTimeout::new(8)),
            send_queue: Arc::new(SizedQueueWithTimeout::new(8)),
            send_frequency: Duration::from_millis(100),
            max_batch_size: 3,
        };

        let mut batched = HashMap::new();
        let events: Vec<Event> = (0..7)
            .map(|i| {
                let mut event = test_event("ds");
                event.metadata = Some(serde_json::json!(i));
                event
            })
            .collect();
        batched.insert(Destination::of(&events[0]), events);

        batcher.flush(&mut batched);
        assert!(batched.is_empty());

        let mut sizes = Vec::new();
        let mut order = Vec::new();
        while let Ok(Some(unit)) = batcher.send_queue.pop(Wait::NoWait) {
            sizes.push(unit.events.len());
            for event in unit.events {
                order.push(event.metadata.expect("metadata should be set"));
            }
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        let expected: Vec<serde_json::Value> = (0..7).map(|i| serde_json::json!(i)).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_invalid_event_answered_locally() {
        let tx = TransmissionClient::new(TransmissionOptions::default())
            .expect("engine should build");
        let mut event = Event::new("https://api.honeycomb.io/", "", "", 1);
        event.metadata = Some(serde_json::json!(41));
        tx.add(event);

        let response = tx
            .responses()
            .pop(Wait::NoWait)
            .expect("validation response should be immediate")
            .expect("response should not be the sentinel");
        assert_eq!(response.status_code, 0);
        assert_eq!(response.metadata, Some(serde_json::json!(41)));
        let message = response.error.expect("error should be set");
        assert!(message.contains("write key"));
        assert!(message.contains("dataset"));
        assert!(!message.contains("api host"));

        // No threads were started for an event that never got in.
        assert!(tx.batch_queue.is_empty());
        tx.close(true);
    }

    #[test]
    fn test_close_without_work_is_idempotent() {
        let tx = TransmissionClient::new(TransmissionOptions::default())
            .expect("engine should build");
        assert_eq!(tx.close(true), 0);
        assert_eq!(tx.close(false), 0);

        // Terminal sentinel exactly once.
        let responses = tx.responses();
        assert_eq!(responses.pop(Wait::NoWait), Ok(None));
        assert!(responses.is_empty());
    }

    #[test]
    fn test_add_after_close_is_declined() {
        let tx = TransmissionClient::new(TransmissionOptions::default())
            .expect("engine should build");
        tx.close(true);
        tx.add(test_event("ds"));
        assert!(tx.batch_queue.is_empty());
        // Only the terminal sentinel is observable.
        assert_eq!(tx.responses().pop(Wait::NoWait), Ok(None));
        assert!(tx.responses().is_empty());
    }

    #[test]
    fn test_spawns_are_declined_once_close_begins() {
        let tx = TransmissionClient::new(TransmissionOptions::default())
            .expect("engine should build");
        let mut event = Event::new("http://127.0.0.1:9", "wk", "ds", 1);
        event.add_field("k", "v");
        tx.add(event);

        // Interleave a submission with the first half of close: the
        // closing flag is swapped and the worker handles are taken, but
        // no sentinels have gone out yet.
        tx.closing.store(true, Ordering::SeqCst);
        let (batcher, senders) = {
            let mut workers = tx.lock_workers();
            (workers.batcher.take(), std::mem::take(&mut workers.senders))
        };
        assert!(batcher.is_some());

        tx.ensure_threads_running();
        {
            let workers = tx.lock_workers();
            assert!(workers.batcher.is_none());
            assert!(workers.senders.is_empty());
        }

        // Hand the handles back so close can unwind the pipeline.
        {
            let mut workers = tx.lock_workers();
            workers.batcher = batcher;
            workers.senders = senders;
        }
        tx.close(false);
    }

    #[test]
    fn test_purge_close_reports_discarded_count() {
        let tx = TransmissionClient::new(TransmissionOptions::default())
            .expect("engine should build");

        // Stage work on both queues directly; with no threads running
        // nothing drains before the purge, so the count is exact.
        for _ in 0..3 {
            tx.batch_queue
                .push(Some(test_event("ds")), Wait::NoWait)
                .expect("push failed");
        }
        let unit = SendUnit {
            destination: Destination::of(&test_event("ds")),
            events: vec![test_event("ds"), test_event("ds")],
        };
        tx.send_queue
            .push(Some(unit), Wait::NoWait)
            .expect("push failed");

        assert_eq!(tx.close(false), 5);
        assert!(tx.batch_queue.is_empty());
        assert!(tx.send_queue.is_empty());
    }
}
