//! Shared helpers for integration tests
#![allow(dead_code)]

use chatcast_common::events::EventBus;
use chatcast_responder::client::AnswerRequestClient;
use chatcast_responder::comment::Comment;
use chatcast_responder::config::{BackendConfig, ResponderConfig};
use chatcast_responder::metrics::PipelineCounters;
use chatcast_responder::pipeline::{PipelineController, PipelineParts};
use chatcast_responder::testing::{MapAudioFetcher, RecordingSink, ScriptedResponse, ScriptedTransport};
use std::sync::Arc;
use std::time::Duration;

pub const API_URL: &str = "http://backend.test/v1/chat-messages";
pub const BASE_URL: &str = "http://backend.test";

pub fn backend_config() -> BackendConfig {
    BackendConfig {
        api_url: API_URL.to_string(),
        api_key: "app-test-key".to_string(),
        ..Default::default()
    }
}

pub fn client(transport: Arc<ScriptedTransport>) -> Arc<AnswerRequestClient> {
    Arc::new(AnswerRequestClient::new(&backend_config(), transport).unwrap())
}

/// Config with no warm-up window and no playback gaps
pub fn pipeline_config() -> ResponderConfig {
    let mut config = ResponderConfig::default();
    config.backend = backend_config();
    config.pipeline.cold_start_secs = 0;
    config.playback.gap_before_unit_ms = 0;
    config.playback.gap_between_chunks_ms = 0;
    config.playback.gap_after_unit_ms = 0;
    config
}

/// Answer markup with one `text:`/`voice:` pair per entry
pub fn markup(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(text, voice)| format!("text: {}\nvoice: {}\n", text, voice))
        .collect()
}

/// Streamed markup answer whose voices all resolve against [`BASE_URL`]
pub fn voiced_answer(fetcher: &MapAudioFetcher, tag: &str, texts: &[&str]) -> ScriptedResponse {
    let voices: Vec<String> = (0..texts.len()).map(|i| format!("/files/{}-{}.mp3", tag, i)).collect();
    for (i, voice) in voices.iter().enumerate() {
        fetcher.insert_ok(&format!("{}{}", BASE_URL, voice), vec![i as u8 + 1; 4]);
    }
    let pairs: Vec<(&str, &str)> = texts.iter().copied().zip(voices.iter().map(String::as_str)).collect();
    ScriptedResponse::answer(&markup(&pairs))
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub fetcher: Arc<MapAudioFetcher>,
    pub sink: Arc<RecordingSink>,
    pub events: EventBus,
    pub controller: Arc<PipelineController>,
}

impl Harness {
    pub fn new(config: &ResponderConfig, play_duration: Duration) -> Self {
        Self::with_fetcher(config, play_duration, MapAudioFetcher::new())
    }

    pub fn with_fetcher(config: &ResponderConfig, play_duration: Duration, fetcher: MapAudioFetcher) -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        let fetcher = Arc::new(fetcher);
        let sink = Arc::new(RecordingSink::new(play_duration));
        let events = EventBus::new(256);

        let controller = Arc::new(PipelineController::new(
            config,
            PipelineParts {
                client: Arc::new(AnswerRequestClient::new(&config.backend, transport.clone()).unwrap()),
                fetcher: fetcher.clone(),
                sink: sink.clone(),
                events: events.clone(),
                metrics: Arc::new(PipelineCounters::new()),
            },
        ));

        Self { transport, fetcher, sink, events, controller }
    }

    /// Script a voiced answer for `text` and submit a comment with that text
    pub fn submit_answered(&self, id: &str, text: &str) {
        self.transport
            .respond_to(text, voiced_answer(&self.fetcher, id, &[text]));
        self.controller.submit(comment(id, text));
    }
}

pub fn comment(id: &str, text: &str) -> Comment {
    Comment::new(text, "viewer").with_id(id)
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
