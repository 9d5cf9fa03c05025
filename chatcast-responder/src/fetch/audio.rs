//! Audio resource download

use crate::error::{Error, Result};
use crate::fetch::markup::{PlannedAudio, PlannedChunk};
use crate::playback::unit::{AudioClip, AudioLocator, Chunk};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retrieves the bytes behind a remote audio reference
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpAudioFetcher {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpAudioFetcher {
    /// Reuses an existing client (connection pool) with a per-download timeout
    pub fn new(http_client: reqwest::Client, timeout: Duration) -> Self {
        Self { http_client, timeout }
    }
}

#[async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http_client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::AudioFetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::AudioFetch(format!("{}: HTTP {}", url, status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::AudioFetch(format!("{}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Obtain audio for every planned chunk concurrently.
///
/// A failed or empty download degrades that chunk to text-only. Returns
/// `Err(Cancelled)` if `cancel` fires before all downloads settle.
pub async fn fetch_chunks(
    fetcher: &dyn AudioFetcher,
    planned: Vec<PlannedChunk>,
    cancel: &CancellationToken,
) -> Result<Vec<Chunk>> {
    let started = Instant::now();
    let remote = planned
        .iter()
        .filter(|c| matches!(c.audio, PlannedAudio::Remote(_)))
        .count();

    let downloads = planned.into_iter().enumerate().map(|(index, chunk)| async move {
        let audio = match chunk.audio {
            PlannedAudio::Remote(url) => fetch_one(fetcher, &url).await.map(|bytes| AudioClip {
                locator: AudioLocator::Remote(url),
                bytes,
            }),
            PlannedAudio::Inline(bytes) => Some(AudioClip { locator: AudioLocator::Inline, bytes }),
            PlannedAudio::None => None,
        };
        Chunk { index, text: chunk.text, audio }
    });

    let chunks = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        chunks = futures::future::join_all(downloads) => chunks,
    };

    debug!(
        remote,
        with_audio = chunks.iter().filter(|c| c.has_audio()).count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Audio downloads settled"
    );
    Ok(chunks)
}

async fn fetch_one(fetcher: &dyn AudioFetcher, url: &str) -> Option<Vec<u8>> {
    match fetcher.fetch(url).await {
        Ok(bytes) if bytes.is_empty() => {
            warn!(url = %url, "Audio download returned an empty body");
            None
        }
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(url = %url, error = %e, "Audio download failed");
            None
        }
    }
}
