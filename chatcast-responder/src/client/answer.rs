//! Answer request client
//!
//! Sends one streaming chat request per comment and folds the decoded events
//! into an [`AnswerResult`]. Events are also handed to a caller-supplied
//! callback as they arrive, so listeners see text before the stream ends.
//!
//! **Cancellation:** once the token fires no further callbacks run and the
//! transport stream is dropped.

use crate::client::transport::{StreamRequest, Transport};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::stream::{
    CorrelationIds, LineSplitter, ParseOutcome, StreamEvent, StreamEventParser, MAX_LINE_BYTES,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One question for the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRequest {
    pub query_text: String,
    pub user_id: String,
    /// Empty or absent starts a new conversation
    pub conversation_id: Option<String>,
}

impl AnswerRequest {
    pub fn new(query_text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            user_id: user_id.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.query_text.trim().is_empty() {
            return Err(Error::Validation("query text is empty".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::Validation("user id is empty".to_string()));
        }
        Ok(())
    }
}

/// Aggregate of one answer stream
#[derive(Debug, Default)]
pub struct AnswerResult {
    /// Concatenated text deltas
    pub text: String,
    /// Inline audio chunks in arrival order
    pub audio_chunks: Vec<Vec<u8>>,
    pub correlation: CorrelationIds,
    pub success: bool,
    pub error: Option<Error>,
    /// Message from an in-stream `error` event
    pub backend_error: Option<String>,
    pub elapsed: Duration,
    pub event_count: usize,
    pub parse_errors: usize,
    /// End marker or end-of-stream event seen (false means the connection just closed)
    pub ended_explicitly: bool,
}

impl AnswerResult {
    /// Fold one event in; returns true when the event ends the answer
    pub fn apply(&mut self, event: &StreamEvent) -> bool {
        self.event_count += 1;
        self.correlation.merge(event.correlation_ids());

        match event {
            StreamEvent::TextDelta { text, .. } => self.text.push_str(text),
            StreamEvent::AudioChunk { bytes, .. } => self.audio_chunks.push(bytes.clone()),
            StreamEvent::Custom { kind, detail, .. } => {
                if kind == "error" {
                    let detail = detail.clone().unwrap_or_else(|| "unspecified".to_string());
                    warn!(detail = %detail, "Backend reported an error in the answer stream");
                    self.backend_error = Some(detail);
                }
            }
            StreamEvent::EndOfStream { .. } => {
                self.ended_explicitly = true;
                return true;
            }
        }
        false
    }

    /// All inline audio joined, if any arrived
    pub fn inline_audio(&self) -> Option<Vec<u8>> {
        if self.audio_chunks.is_empty() {
            None
        } else {
            Some(self.audio_chunks.concat())
        }
    }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    /// Mark failed and drop partial content
    fn fail(&mut self, error: Error) {
        self.success = false;
        self.text.clear();
        self.audio_chunks.clear();
        self.error = Some(error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineFlow {
    Continue,
    Stop,
}

/// Streaming client for the conversational backend
pub struct AnswerRequestClient {
    transport: Arc<dyn Transport>,
    endpoint: String,
    base_url: String,
    api_key: String,
    request_timeout: Duration,
    max_line_bytes: usize,
}

impl AnswerRequestClient {
    /// Validates the backend settings; an invalid endpoint or credential is a
    /// `Configuration` error here, never a failed request later.
    pub fn new(config: &BackendConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let endpoint = config.api_url.trim().to_string();
        let base_url = base_url_of(&endpoint)?;

        Ok(Self {
            transport,
            endpoint,
            base_url,
            api_key: config.api_key.trim().to_string(),
            request_timeout: config.request_timeout(),
            max_line_bytes: MAX_LINE_BYTES,
        })
    }

    /// Longest stream line accepted; longer lines are dropped as parse errors
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// `scheme://host[:port]` of the endpoint, for resolving relative resources
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// JSON body for one streaming chat request
    pub fn build_body(&self, request: &AnswerRequest) -> serde_json::Value {
        json!({
            "inputs": {},
            "query": request.query_text,
            "response_mode": "streaming",
            "conversation_id": request.conversation_id.clone().unwrap_or_default(),
            "user": request.user_id,
            "auto_generate_name": false,
        })
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Authorization".to_string(), format!("Bearer {}", self.api_key)),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "text/event-stream".to_string()),
            ("Cache-Control".to_string(), "no-cache".to_string()),
        ]
    }

    /// Send one request and stream its answer.
    ///
    /// `on_event` runs synchronously for every decoded event, in arrival order.
    /// Failures never escape as `Err`: they come back as `success == false`
    /// with `error` set and no partial text or audio.
    pub async fn send<F>(
        &self,
        request: &AnswerRequest,
        mut on_event: F,
        cancel: &CancellationToken,
    ) -> AnswerResult
    where
        F: FnMut(&StreamEvent) + Send,
    {
        let started = Instant::now();
        let mut result = AnswerResult::default();

        if let Err(e) = request.validate() {
            warn!(user = %request.user_id, error = %e, "Rejected answer request");
            result.fail(e);
            result.elapsed = started.elapsed();
            return result;
        }

        debug!(
            user = %request.user_id,
            chars = request.query_text.chars().count(),
            "Sending answer request"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            streamed = tokio::time::timeout(
                self.request_timeout,
                self.stream_answer(request, &mut on_event, &mut result, cancel),
            ) => streamed.unwrap_or(Err(Error::Timeout(self.request_timeout))),
        };

        result.elapsed = started.elapsed();
        match outcome {
            Ok(()) => {
                result.success = true;
                info!(
                    user = %request.user_id,
                    events = result.event_count,
                    chars = result.text.chars().count(),
                    audio_chunks = result.audio_chunks.len(),
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "Answer stream complete"
                );
            }
            Err(e) if e.is_cancellation() => {
                debug!(user = %request.user_id, "Answer request cancelled");
                result.fail(e);
            }
            Err(e) => {
                warn!(user = %request.user_id, error = %e, "Answer request failed");
                result.fail(e);
            }
        }
        result
    }

    async fn stream_answer<F>(
        &self,
        request: &AnswerRequest,
        on_event: &mut F,
        result: &mut AnswerResult,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        F: FnMut(&StreamEvent) + Send,
    {
        let stream_request = StreamRequest {
            url: self.endpoint.clone(),
            headers: self.headers(),
            body: self.build_body(request),
        };
        let mut stream = self.transport.open_stream(stream_request).await?;

        let mut splitter = LineSplitter::with_max_line(self.max_line_bytes);
        let mut parser = StreamEventParser::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let lines = splitter.push(&chunk);
            result.parse_errors += splitter.take_dropped();
            for line in lines {
                if process_line(&mut parser, &line, on_event, result, cancel)? == LineFlow::Stop {
                    return Ok(());
                }
            }
        }

        if let Some(line) = splitter.finish() {
            process_line(&mut parser, &line, on_event, result, cancel)?;
        }
        result.parse_errors += splitter.take_dropped();

        debug!(events = result.event_count, "Answer stream closed without end marker");
        Ok(())
    }

    /// Reachability probe; every failure (including cancellation) is `false`
    pub async fn test_connection(&self, cancel: &CancellationToken) -> bool {
        let headers = vec![("Authorization".to_string(), format!("Bearer {}", self.api_key))];

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            reachable = tokio::time::timeout(
                self.request_timeout,
                self.transport.probe(&self.endpoint, &headers),
            ) => {
                let reachable = reachable.unwrap_or(false);
                info!(endpoint = %self.endpoint, reachable, "Backend connection test");
                reachable
            }
        }
    }
}

fn process_line<F>(
    parser: &mut StreamEventParser,
    line: &str,
    on_event: &mut F,
    result: &mut AnswerResult,
    cancel: &CancellationToken,
) -> Result<LineFlow>
where
    F: FnMut(&StreamEvent) + Send,
{
    match parser.feed(line) {
        ParseOutcome::Event(event) => {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            on_event(&event);
            if result.apply(&event) {
                Ok(LineFlow::Stop)
            } else {
                Ok(LineFlow::Continue)
            }
        }
        ParseOutcome::EndMarker => {
            result.ended_explicitly = true;
            Ok(LineFlow::Stop)
        }
        ParseOutcome::ParseError(detail) => {
            result.parse_errors += 1;
            warn!(detail = %detail, "Skipping malformed stream line");
            Ok(LineFlow::Continue)
        }
        ParseOutcome::Skipped => Ok(LineFlow::Continue),
    }
}

/// `scheme://host[:port]` of an absolute URL
pub fn base_url_of(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| Error::Configuration(format!("invalid URL '{}': {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Configuration(format!("URL '{}' has no host", url)))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::HttpTransport;

    fn client() -> AnswerRequestClient {
        let config = BackendConfig {
            api_url: "http://localhost:8080/v1/chat-messages".to_string(),
            api_key: "app-key".to_string(),
            ..Default::default()
        };
        let transport = Arc::new(HttpTransport::new(Duration::from_secs(1)).unwrap());
        AnswerRequestClient::new(&config, transport).unwrap()
    }

    #[test]
    fn test_request_validation() {
        assert!(AnswerRequest::new("hi", "alice").validate().is_ok());
        assert!(matches!(
            AnswerRequest::new("  ", "alice").validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            AnswerRequest::new("hi", "").validate(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_body_shape() {
        let body = client().build_body(&AnswerRequest::new("what's up", "bob"));
        assert_eq!(body["query"], "what's up");
        assert_eq!(body["user"], "bob");
        assert_eq!(body["response_mode"], "streaming");
        assert_eq!(body["conversation_id"], "");
        assert_eq!(body["auto_generate_name"], false);
        assert!(body["inputs"].as_object().unwrap().is_empty());

        let body = client().build_body(
            &AnswerRequest::new("again", "bob").with_conversation(Some("conv-7".into())),
        );
        assert_eq!(body["conversation_id"], "conv-7");
    }

    #[test]
    fn test_headers() {
        let headers = client().headers();
        assert!(headers.contains(&("Authorization".into(), "Bearer app-key".into())));
        assert!(headers.contains(&("Accept".into(), "text/event-stream".into())));
        assert!(headers.contains(&("Cache-Control".into(), "no-cache".into())));
    }

    #[test]
    fn test_base_url() {
        assert_eq!(client().base_url(), "http://localhost:8080");
        assert_eq!(base_url_of("https://api.example.com/v1/x").unwrap(), "https://api.example.com");
        assert!(base_url_of("not a url").is_err());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let transport = Arc::new(HttpTransport::new(Duration::from_secs(1)).unwrap());
        let config = BackendConfig::default(); // empty key
        assert!(matches!(
            AnswerRequestClient::new(&config, transport),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_apply_folds_events() {
        let mut result = AnswerResult::default();
        assert!(!result.apply(&StreamEvent::text("Hel")));
        assert!(!result.apply(&StreamEvent::TextDelta {
            text: "lo".into(),
            ids: CorrelationIds { conversation_id: Some("c1".into()), ..Default::default() },
        }));
        assert!(!result.apply(&StreamEvent::AudioChunk { bytes: vec![1, 2], ids: Default::default() }));
        assert!(!result.apply(&StreamEvent::AudioChunk { bytes: vec![3], ids: Default::default() }));
        assert!(result.apply(&StreamEvent::EndOfStream {
            ids: CorrelationIds { message_id: Some("m1".into()), ..Default::default() },
        }));

        assert_eq!(result.text, "Hello");
        assert_eq!(result.inline_audio(), Some(vec![1, 2, 3]));
        assert_eq!(result.correlation.conversation_id.as_deref(), Some("c1"));
        assert_eq!(result.correlation.message_id.as_deref(), Some("m1"));
        assert_eq!(result.event_count, 5);
        assert!(result.ended_explicitly);
    }
}
