//! Pipeline wiring
//!
//! [`PipelineController`] owns both stages. Comments come in through
//! [`PipelineController::submit`], pass admission, and are queued for
//! answering; completed answers are forwarded to playback. Each stage has its
//! own cancellation scope so one can be cleared without touching the other.

use crate::client::AnswerRequestClient;
use crate::comment::Comment;
use crate::config::ResponderConfig;
use crate::fetch::audio::AudioFetcher;
use crate::fetch::task::{TaskDeps, TaskOutcome, TaskState};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::admission::{Admission, AdmissionFilter};
use crate::pipeline::request_queue::RequestQueue;
use crate::pipeline::scoped_queue::PushError;
use crate::playback::queue::{PlaybackGaps, PlaybackQueue};
use crate::playback::sink::PlaybackSink;
use chatcast_common::events::{ChatcastEvent, DropReason, EventBus};
use chatcast_common::time::now;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happened to a submitted comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Queued { depth: usize },
    Suppressed,
    Dropped { reason: DropReason },
    ShutDown,
}

/// Items discarded by a cancel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CancelSummary {
    pub requests_discarded: usize,
    pub playback_discarded: usize,
}

/// Point-in-time view of both stages
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub pending_requests: usize,
    pub fetching: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_comment: Option<String>,
    pub pending_playback: usize,
    pub playing: bool,
    pub metrics: MetricsSnapshot,
}

/// External collaborators of the pipeline
pub struct PipelineParts {
    pub client: Arc<AnswerRequestClient>,
    pub fetcher: Arc<dyn AudioFetcher>,
    pub sink: Arc<dyn PlaybackSink>,
    pub events: EventBus,
    pub metrics: Arc<dyn PipelineMetrics>,
}

pub struct PipelineController {
    admission: AdmissionFilter,
    requests: Arc<RequestQueue>,
    playback: Arc<PlaybackQueue>,
    client: Arc<AnswerRequestClient>,
    events: EventBus,
    metrics: Arc<dyn PipelineMetrics>,
    shutdown: CancellationToken,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineController {
    pub fn new(config: &ResponderConfig, parts: PipelineParts) -> Self {
        let PipelineParts { client, fetcher, sink, events, metrics } = parts;
        let shutdown = CancellationToken::new();
        let pipeline = &config.pipeline;

        let deps = TaskDeps {
            client: Arc::clone(&client),
            fetcher,
            timeout: pipeline.task_timeout(),
        };
        let requests = RequestQueue::new(
            deps,
            events.clone(),
            Arc::clone(&metrics),
            shutdown.clone(),
            pipeline.max_pending_requests,
            pipeline.keep_conversation,
        );
        let playback = PlaybackQueue::new(
            sink,
            PlaybackGaps::from(&config.playback),
            events.clone(),
            Arc::clone(&metrics),
            shutdown.clone(),
        );

        Self {
            admission: AdmissionFilter::new(pipeline.cold_start(), pipeline.suppress_prefixes.clone()),
            requests: Arc::new(requests),
            playback: Arc::new(playback),
            client,
            events,
            metrics,
            shutdown,
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn both consumer loops. Later calls do nothing.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let playback = Arc::clone(&self.playback);
        let playback_loop = tokio::spawn(Arc::clone(&self.playback).run());
        let request_loop = tokio::spawn(
            Arc::clone(&self.requests).run(move |outcome| forward(&playback, outcome)),
        );

        self.workers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend([playback_loop, request_loop]);
        info!("Pipeline started");
    }

    /// Comment intake; call in the order comments arrived
    pub fn submit(&self, comment: Comment) -> SubmitOutcome {
        self.metrics.comment_received();
        self.events.emit_lossy(ChatcastEvent::CommentReceived {
            comment_id: comment.id.clone(),
            author_name: comment.author_name.clone(),
            text: comment.text.clone(),
            timestamp: now(),
        });

        match self.admission.evaluate(&comment) {
            Admission::Admit => {}
            Admission::ColdStart { .. } => return self.drop_comment(&comment, DropReason::ColdStart),
            Admission::EmptyText => return self.drop_comment(&comment, DropReason::EmptyText),
            Admission::Suppressed => {
                self.metrics.comment_suppressed();
                self.events.emit_lossy(ChatcastEvent::CommentSuppressed {
                    comment_id: comment.id,
                    timestamp: now(),
                });
                return SubmitOutcome::Suppressed;
            }
        }

        let comment_id = comment.id.clone();
        match self.requests.enqueue(comment) {
            Ok(depth) => SubmitOutcome::Queued { depth },
            Err(PushError::Full) => {
                warn!(comment_id = %comment_id, "Request queue full, comment dropped");
                self.metrics.comment_dropped(DropReason::QueueFull);
                self.events.emit_lossy(ChatcastEvent::CommentDropped {
                    comment_id,
                    reason: DropReason::QueueFull,
                    timestamp: now(),
                });
                SubmitOutcome::Dropped { reason: DropReason::QueueFull }
            }
            Err(PushError::ShutDown) => {
                debug!(comment_id = %comment_id, "Pipeline shut down, comment ignored");
                SubmitOutcome::ShutDown
            }
        }
    }

    fn drop_comment(&self, comment: &Comment, reason: DropReason) -> SubmitOutcome {
        self.metrics.comment_dropped(reason);
        self.events.emit_lossy(ChatcastEvent::CommentDropped {
            comment_id: comment.id.clone(),
            reason,
            timestamp: now(),
        });
        SubmitOutcome::Dropped { reason }
    }

    /// Drop the fetch in flight and empty the request queue; playback continues
    pub fn cancel_requests(&self) -> usize {
        self.requests.cancel()
    }

    /// Stop current playback and empty the playback queue; fetching continues
    pub fn cancel_playback(&self) -> usize {
        self.playback.cancel()
    }

    pub fn cancel_all(&self) -> CancelSummary {
        CancelSummary {
            requests_discarded: self.cancel_requests(),
            playback_discarded: self.cancel_playback(),
        }
    }

    /// Cancel everything and wait for both loops to exit
    pub async fn shutdown(&self) {
        info!("Pipeline shutting down");
        self.shutdown.cancel();

        let workers: Vec<_> = self.workers.lock().unwrap_or_else(|p| p.into_inner()).drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Pipeline worker ended abnormally");
            }
        }
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            pending_requests: self.requests.len(),
            fetching: self.requests.is_busy(),
            current_comment: self.requests.current_comment(),
            pending_playback: self.playback.len(),
            playing: self.playback.is_playing(),
            metrics: self.metrics.snapshot(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn backend_endpoint(&self) -> &str {
        self.client.endpoint()
    }

    /// Backend reachability; false once shut down
    pub async fn test_connection(&self) -> bool {
        self.client.test_connection(&self.shutdown.child_token()).await
    }
}

/// Only completed answers reach playback
fn forward(playback: &PlaybackQueue, outcome: TaskOutcome) {
    let comment_id = outcome.comment.id.clone();
    match (outcome.state, outcome.unit) {
        (TaskState::Completed, Some(unit)) => {
            if let Err(e) = playback.enqueue(unit) {
                debug!(comment_id = %comment_id, error = %e, "Answer not queued for playback");
            }
        }
        (TaskState::Cancelled, _) => {
            debug!(comment_id = %comment_id, "Cancelled answer discarded");
        }
        (state, _) => {
            info!(comment_id = %comment_id, state = ?state, "No playback for comment");
        }
    }
}
