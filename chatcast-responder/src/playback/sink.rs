//! Playback sinks
//!
//! The playback queue drives a [`PlaybackSink`]: it announces each chunk's
//! subtitle, hands over the chunk's audio, and reports when a whole unit is
//! done. Audio output devices live behind this trait.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Called before the chunk's audio (also for chunks without audio)
    async fn on_chunk_started(&self, comment_id: &str, index: usize, text: &str);

    /// Play decodable audio bytes and resolve when playback has finished.
    ///
    /// Must return promptly with `Err(Cancelled)` once `cancel` fires.
    async fn play(&self, audio: &[u8], cancel: &CancellationToken) -> Result<()>;

    /// Called exactly once per unit; `finished` is false when cut short
    async fn on_chain_completed(&self, comment_id: &str, finished: bool);
}

/// Sink for headless operation: shows subtitles in the log and holds the
/// playback slot for each clip's real duration, so downstream renderers
/// subscribed to the event stream stay in sync with the timing.
#[derive(Debug, Clone, Default)]
pub struct SubtitleSink {
    /// Used when a clip cannot be decoded
    fallback_duration: Duration,
}

impl SubtitleSink {
    pub fn new(fallback_duration: Duration) -> Self {
        Self { fallback_duration }
    }
}

#[async_trait]
impl PlaybackSink for SubtitleSink {
    async fn on_chunk_started(&self, comment_id: &str, index: usize, text: &str) {
        info!(comment_id = %comment_id, index, subtitle = %text, "Subtitle");
    }

    async fn play(&self, audio: &[u8], cancel: &CancellationToken) -> Result<()> {
        let duration = match probe_duration(audio) {
            Ok(duration) => duration,
            Err(e) => {
                warn!(bytes = audio.len(), error = %e, "Undecodable clip, using fallback duration");
                self.fallback_duration
            }
        };
        debug!(duration_ms = duration.as_millis() as u64, "Playing clip");

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn on_chain_completed(&self, comment_id: &str, finished: bool) {
        debug!(comment_id = %comment_id, finished, "Playback chain completed");
    }
}

/// Duration of an in-memory audio clip.
///
/// Uses the container's frame count when present, otherwise sums packet
/// durations.
pub fn probe_duration(audio: &[u8]) -> Result<Duration> {
    if audio.is_empty() {
        return Err(Error::Playback("empty clip".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(audio.to_vec())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(&Hint::new(), mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Playback(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Playback("No audio track found".to_string()))?;

    let track_id = track.id;
    let params = track.codec_params.clone();

    let frames = match params.n_frames {
        Some(frames) => frames,
        None => {
            let mut total = 0u64;
            loop {
                match format.next_packet() {
                    Ok(packet) if packet.track_id() == track_id => total += packet.dur,
                    Ok(_) => continue,
                    // End of stream or a damaged tail: use what was read
                    Err(_) => break,
                }
            }
            total
        }
    };

    if let Some(time_base) = params.time_base {
        let time = time_base.calc_time(frames);
        return Ok(Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac));
    }
    match params.sample_rate {
        Some(rate) if rate > 0 => Ok(Duration::from_secs_f64(frames as f64 / rate as f64)),
        _ => Err(Error::Playback("Clip has no time base or sample rate".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One channel of 16-bit silence
    fn wav_bytes(sample_rate: u32, samples: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..samples {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_probe_wav_duration() {
        let duration = probe_duration(&wav_bytes(8000, 4000)).unwrap();
        assert!((duration.as_secs_f64() - 0.5).abs() < 0.01, "got {:?}", duration);
    }

    #[test]
    fn test_probe_rejects_garbage() {
        assert!(probe_duration(b"definitely not audio").is_err());
        assert!(probe_duration(&[]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_waits_for_clip_duration() {
        let sink = SubtitleSink::new(Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        sink.play(&wav_bytes(8000, 8000), &CancellationToken::new()).await.unwrap();
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(990) && waited <= Duration::from_millis(1010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_falls_back_for_undecodable_clip() {
        let sink = SubtitleSink::new(Duration::from_millis(300));
        let started = tokio::time::Instant::now();
        sink.play(b"junk", &CancellationToken::new()).await.unwrap();
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300) && waited < Duration::from_millis(310));
    }

    #[tokio::test]
    async fn test_play_cancelled() {
        let sink = SubtitleSink::new(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = sink.play(b"junk", &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
