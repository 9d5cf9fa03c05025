//! Scripted collaborators for tests
//!
//! Compiled for unit tests and, through the `test-support` feature, for the
//! integration tests under `tests/`.

use crate::client::transport::{ByteStream, StreamRequest, Transport};
use crate::error::{Error, Result};
use crate::fetch::audio::AudioFetcher;
use crate::playback::sink::PlaybackSink;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Tracks concurrent users of a resource
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl ConcurrencyProbe {
    fn enter(self: &Arc<Self>) -> ProbeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        ProbeGuard { probe: Arc::clone(self) }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

struct ProbeGuard {
    probe: Arc<ConcurrencyProbe>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Transport
// ============================================================================

/// One scripted answer stream
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    chunks: Vec<Vec<u8>>,
    chunk_delay: Duration,
    open_delay: Duration,
    hang: bool,
    open_error: Option<String>,
}

impl ScriptedResponse {
    /// Raw byte chunks, delivered as given
    pub fn raw(chunks: Vec<Vec<u8>>) -> Self {
        Self { chunks, ..Default::default() }
    }

    /// Each line becomes one chunk, newline-terminated
    pub fn lines(lines: &[&str]) -> Self {
        Self::raw(lines.iter().map(|l| format!("{}\n", l).into_bytes()).collect())
    }

    /// Each payload becomes a `data:` line followed by a blank line
    pub fn events(payloads: &[serde_json::Value]) -> Self {
        Self::raw(
            payloads
                .iter()
                .map(|p| format!("data: {}\n\n", p).into_bytes())
                .collect(),
        )
    }

    /// Streamed answer text split into message events, then `message_end`
    pub fn answer(text: &str) -> Self {
        Self::events(&[
            serde_json::json!({"event": "message", "answer": text, "conversation_id": "conv-1"}),
            serde_json::json!({"event": "message_end", "conversation_id": "conv-1", "message_id": "msg-1"}),
        ])
    }

    /// Opening the stream fails with a transport error
    pub fn failure(message: &str) -> Self {
        Self { open_error: Some(message.to_string()), ..Default::default() }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Keep the stream open forever after the last chunk
    pub fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }
}

/// Transport returning scripted streams.
///
/// Responses registered for a query text take priority; otherwise responses
/// are consumed first-in first-out.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    by_query: Mutex<HashMap<String, ScriptedResponse>>,
    fifo: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<StreamRequest>>,
    probe_ok: AtomicBool,
    streams: Arc<ConcurrencyProbe>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: ScriptedResponse) {
        lock(&self.fifo).push_back(response);
    }

    pub fn respond_to(&self, query: &str, response: ScriptedResponse) {
        lock(&self.by_query).insert(query.to_string(), response);
    }

    pub fn set_probe_result(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        lock(&self.requests).clone()
    }

    /// Query texts in the order requests were made
    pub fn queries(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.body["query"].as_str().map(str::to_string))
            .collect()
    }

    /// Open-stream concurrency
    pub fn streams(&self) -> &ConcurrencyProbe {
        &self.streams
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream> {
        let query = request.body["query"].as_str().unwrap_or_default().to_string();
        lock(&self.requests).push(request);

        let guard = self.streams.enter();
        let response = lock(&self.by_query)
            .remove(&query)
            .or_else(|| lock(&self.fifo).pop_front())
            .unwrap_or_else(|| ScriptedResponse::failure("no scripted response"));

        let ScriptedResponse { chunks, chunk_delay, open_delay, hang, open_error } = response;
        if !open_delay.is_zero() {
            tokio::time::sleep(open_delay).await;
        }
        if let Some(message) = open_error {
            return Err(Error::Transport(message));
        }

        let stream = async_stream::stream! {
            let _guard = guard;
            for chunk in chunks {
                if !chunk_delay.is_zero() {
                    tokio::time::sleep(chunk_delay).await;
                }
                yield Ok::<_, Error>(chunk);
            }
            if hang {
                futures::future::pending::<()>().await;
            }
        };
        Ok(Box::pin(stream))
    }

    async fn probe(&self, _url: &str, _headers: &[(String, String)]) -> bool {
        self.probe_ok.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Audio fetcher
// ============================================================================

/// Fetcher answering from a URL map; unknown URLs fail
#[derive(Debug, Default)]
pub struct MapAudioFetcher {
    responses: Mutex<HashMap<String, std::result::Result<Vec<u8>, String>>>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    probe: Arc<ConcurrencyProbe>,
}

impl MapAudioFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch takes this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn insert_ok(&self, url: &str, bytes: Vec<u8>) {
        lock(&self.responses).insert(url.to_string(), Ok(bytes));
    }

    pub fn insert_err(&self, url: &str, message: &str) {
        lock(&self.responses).insert(url.to_string(), Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn concurrency(&self) -> &ConcurrencyProbe {
        &self.probe
    }
}

#[async_trait]
impl AudioFetcher for MapAudioFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        lock(&self.calls).push(url.to_string());
        let _guard = self.probe.enter();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match lock(&self.responses).get(url) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(message)) => Err(Error::AudioFetch(message.clone())),
            None => Err(Error::AudioFetch(format!("{}: HTTP 404", url))),
        }
    }
}

// ============================================================================
// Playback sink
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    ChunkStarted { comment_id: String, index: usize, text: String },
    Played { bytes: usize },
    ChainCompleted { comment_id: String, finished: bool },
}

/// Sink recording every callback; `play` takes a fixed time
#[derive(Debug, Default)]
pub struct RecordingSink {
    play_duration: Duration,
    calls: Mutex<Vec<SinkCall>>,
    changed: Notify,
}

impl RecordingSink {
    pub fn new(play_duration: Duration) -> Self {
        Self { play_duration, ..Default::default() }
    }

    fn record(&self, call: SinkCall) {
        lock(&self.calls).push(call);
        self.changed.notify_waiters();
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        lock(&self.calls).clone()
    }

    /// Comment ids in the order their units completed
    pub fn completed_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::ChainCompleted { comment_id, .. } => Some(comment_id),
                _ => None,
            })
            .collect()
    }

    pub fn chains_completed(&self) -> usize {
        self.completed_ids().len()
    }

    /// Wait until `condition` holds over the recorded calls
    pub async fn wait_until<F>(&self, condition: F, timeout: Duration) -> bool
    where
        F: Fn(&[SinkCall]) -> bool,
    {
        tokio::time::timeout(timeout, async {
            loop {
                let changed = self.changed.notified();
                if condition(&lock(&self.calls)) {
                    return;
                }
                changed.await;
            }
        })
        .await
        .is_ok()
    }

    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(|calls| calls.len() >= count, timeout).await
    }

    pub async fn wait_for_chains(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(
            |calls| {
                calls
                    .iter()
                    .filter(|c| matches!(c, SinkCall::ChainCompleted { .. }))
                    .count()
                    >= count
            },
            timeout,
        )
        .await
    }
}

#[async_trait]
impl PlaybackSink for RecordingSink {
    async fn on_chunk_started(&self, comment_id: &str, index: usize, text: &str) {
        self.record(SinkCall::ChunkStarted {
            comment_id: comment_id.to_string(),
            index,
            text: text.to_string(),
        });
    }

    async fn play(&self, audio: &[u8], cancel: &CancellationToken) -> Result<()> {
        self.record(SinkCall::Played { bytes: audio.len() });
        if self.play_duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(self.play_duration) => Ok(()),
        }
    }

    async fn on_chain_completed(&self, comment_id: &str, finished: bool) {
        self.record(SinkCall::ChainCompleted { comment_id: comment_id.to_string(), finished });
    }
}
