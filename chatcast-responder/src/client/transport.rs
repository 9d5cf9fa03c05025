//! Streaming HTTP transport
//!
//! The answer client only needs "send a request, receive byte chunks" and a
//! reachability probe. [`Transport`] captures that contract so tests can script
//! streams without a server; [`HttpTransport`] is the reqwest implementation.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("chatcast-responder/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept on an `HttpStatus` error
const ERROR_BODY_LIMIT: usize = 512;

/// Stream of raw body chunks
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// One streaming POST
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return its body as a chunk stream.
    ///
    /// Non-success statuses are reported as errors before any chunk is yielded.
    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream>;

    /// True when `url` answers at all; never errors
    async fn probe(&self, url: &str, headers: &[(String, String)]) -> bool;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client. No overall request timeout is set here: the answer
    /// stream is bounded by the caller's deadline instead.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// Shared reqwest client, reused for audio downloads
    pub fn client(&self) -> &reqwest::Client {
        &self.http_client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream> {
        let body = serde_json::to_vec(&request.body)
            .map_err(|e| Error::Internal(format!("request body: {}", e)))?;

        // Content-Type comes from the caller's header list
        let mut builder = self.http_client.post(&request.url).body(body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(url = %request.url, "Opening answer stream");
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| Error::Transport(e.to_string()))
            })
            .boxed();
        Ok(stream)
    }

    async fn probe(&self, url: &str, headers: &[(String, String)]) -> bool {
        let mut builder = self.http_client.get(url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                debug!(url = %url, status = status.as_u16(), "Probe response");
                // A POST-only endpoint answering 405 is still reachable
                status.is_success() || status == reqwest::StatusCode::METHOD_NOT_ALLOWED
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Probe failed");
                false
            }
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
