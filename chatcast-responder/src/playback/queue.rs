//! Ordered playback of validated answers
//!
//! One consumer loop plays units strictly in the order they were queued, one
//! at a time. Cancelling the playback scope stops the current unit and empties
//! the queue; answer fetching is unaffected.

use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::metrics::PipelineMetrics;
use crate::pipeline::scoped_queue::{PushError, ScopedQueue};
use crate::playback::sink::PlaybackSink;
use crate::playback::unit::PlaybackUnit;
use chatcast_common::events::{ChatcastEvent, EventBus, PipelineStage};
use chatcast_common::time::now;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pauses around and between units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackGaps {
    pub before_unit: Duration,
    pub between_chunks: Duration,
    pub after_unit: Duration,
}

impl From<&PlaybackConfig> for PlaybackGaps {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            before_unit: config.gap_before_unit(),
            between_chunks: config.gap_between_chunks(),
            after_unit: config.gap_after_unit(),
        }
    }
}

pub struct PlaybackQueue {
    queue: ScopedQueue<PlaybackUnit>,
    sink: Arc<dyn PlaybackSink>,
    gaps: PlaybackGaps,
    events: EventBus,
    metrics: Arc<dyn PipelineMetrics>,
}

impl PlaybackQueue {
    pub fn new(
        sink: Arc<dyn PlaybackSink>,
        gaps: PlaybackGaps,
        events: EventBus,
        metrics: Arc<dyn PipelineMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue: ScopedQueue::new(shutdown, 0),
            sink,
            gaps,
            events,
            metrics,
        }
    }

    /// Append a unit. Only fails after shutdown.
    pub fn enqueue(&self, unit: PlaybackUnit) -> Result<usize> {
        let comment_id = unit.comment_id().to_string();
        let chunk_count = unit.chunks.len();

        match self.queue.push(unit) {
            Ok(depth) => {
                self.metrics.unit_queued();
                debug!(comment_id = %comment_id, depth, "Playback unit queued");
                self.events.emit_lossy(ChatcastEvent::PlaybackUnitQueued {
                    comment_id,
                    chunk_count,
                    queue_depth: depth,
                    timestamp: now(),
                });
                Ok(depth)
            }
            Err((_, PushError::Full)) => Err(Error::Internal("playback queue full".to_string())),
            Err((_, PushError::ShutDown)) => Err(Error::Cancelled),
        }
    }

    /// Units waiting (excluding the one playing)
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        self.queue.is_busy()
    }

    /// Stop the current unit and discard queued ones; returns how many were discarded
    pub fn cancel(&self) -> usize {
        let discarded = self.queue.cancel_scope();
        let count = discarded.len();
        // Dropping the units releases their audio
        drop(discarded);

        info!(discarded = count, "Playback scope cancelled");
        self.events.emit_lossy(ChatcastEvent::QueueCleared {
            stage: PipelineStage::Playback,
            discarded: count,
            timestamp: now(),
        });
        count
    }

    /// Consumer loop; returns after shutdown
    pub async fn run(self: Arc<Self>) {
        debug!("Playback loop started");
        while let Some((unit, scope)) = self.queue.next().await {
            let _busy = self.queue.busy_guard();
            self.play_unit(unit, &scope).await;
        }
        debug!("Playback loop stopped");
    }

    async fn play_unit(&self, unit: PlaybackUnit, scope: &CancellationToken) {
        let comment_id = unit.comment_id().to_string();
        info!(
            comment_id = %comment_id,
            author = %unit.comment.author_name,
            chunks = unit.chunks.len(),
            audio_bytes = unit.audio_bytes(),
            "Playback started"
        );
        self.metrics.playback_started();
        self.events.emit_lossy(ChatcastEvent::PlaybackStarted {
            comment_id: comment_id.clone(),
            timestamp: now(),
        });

        let finished = match self.play_chunks(&unit, scope).await {
            Ok(()) => true,
            Err(e) if e.is_cancellation() => {
                debug!(comment_id = %comment_id, "Playback cancelled");
                false
            }
            Err(e) => {
                warn!(comment_id = %comment_id, error = %e, "Playback aborted");
                false
            }
        };
        drop(unit);

        self.sink.on_chain_completed(&comment_id, finished).await;
        self.metrics.playback_finished(finished);
        self.events.emit_lossy(ChatcastEvent::PlaybackCompleted {
            comment_id,
            finished,
            timestamp: now(),
        });
    }

    async fn play_chunks(&self, unit: &PlaybackUnit, scope: &CancellationToken) -> Result<()> {
        pause(self.gaps.before_unit, scope).await?;

        for (position, chunk) in unit.chunks.iter().enumerate() {
            if position > 0 {
                pause(self.gaps.between_chunks, scope).await?;
            }
            if scope.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.sink.on_chunk_started(unit.comment_id(), chunk.index, &chunk.text).await;
            self.events.emit_lossy(ChatcastEvent::SubtitleChunk {
                comment_id: unit.comment_id().to_string(),
                index: chunk.index,
                text: chunk.text.clone(),
                timestamp: now(),
            });

            if let Some(audio) = &chunk.audio {
                match self.sink.play(&audio.bytes, scope).await {
                    Ok(()) => {}
                    Err(e) if e.is_cancellation() => return Err(e),
                    // One bad clip does not silence the rest of the answer
                    Err(e) => warn!(
                        comment_id = %unit.comment_id(),
                        index = chunk.index,
                        error = %e,
                        "Chunk playback failed"
                    ),
                }
            }
        }

        pause(self.gaps.after_unit, scope).await
    }
}

async fn pause(duration: Duration, scope: &CancellationToken) -> Result<()> {
    if duration.is_zero() {
        return if scope.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) };
    }
    tokio::select! {
        biased;
        _ = scope.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
