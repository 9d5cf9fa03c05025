//! Ordered answer fetching
//!
//! Admitted comments wait here in arrival order. A single consumer loop runs
//! one [`AnswerFetchTask`] at a time and hands every outcome to the caller,
//! which decides what reaches playback.

use crate::comment::Comment;
use crate::fetch::task::{AnswerFetchTask, TaskDeps, TaskOutcome};
use crate::metrics::PipelineMetrics;
use crate::pipeline::scoped_queue::{PushError, ScopedQueue};
use chatcast_common::events::{ChatcastEvent, EventBus, PipelineStage};
use chatcast_common::time::{duration_ms, now};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct RequestQueue {
    queue: ScopedQueue<Comment>,
    deps: TaskDeps,
    events: EventBus,
    metrics: Arc<dyn PipelineMetrics>,
    keep_conversation: bool,
    conversation_id: Mutex<Option<String>>,
    current: Mutex<Option<String>>,
}

impl RequestQueue {
    /// `capacity` of 0 leaves the queue unbounded
    pub fn new(
        deps: TaskDeps,
        events: EventBus,
        metrics: Arc<dyn PipelineMetrics>,
        shutdown: CancellationToken,
        capacity: usize,
        keep_conversation: bool,
    ) -> Self {
        Self {
            queue: ScopedQueue::new(shutdown, capacity),
            deps,
            events,
            metrics,
            keep_conversation,
            conversation_id: Mutex::new(None),
            current: Mutex::new(None),
        }
    }

    /// Append a comment; returns the queue depth after the push
    pub fn enqueue(&self, comment: Comment) -> Result<usize, PushError> {
        let comment_id = comment.id.clone();
        let depth = self.queue.push(comment).map_err(|(_, reason)| reason)?;
        debug!(comment_id = %comment_id, depth, "Comment queued for answering");
        Ok(depth)
    }

    /// Comments waiting (excluding the one being fetched)
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_busy(&self) -> bool {
        self.queue.is_busy()
    }

    /// Comment id of the task in flight, if any
    pub fn current_comment(&self) -> Option<String> {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Abandon the fetch in flight and discard waiting comments
    pub fn cancel(&self) -> usize {
        let discarded = self.queue.cancel_scope().len();
        info!(discarded, "Request scope cancelled");
        self.events.emit_lossy(ChatcastEvent::QueueCleared {
            stage: PipelineStage::Requests,
            discarded,
            timestamp: now(),
        });
        discarded
    }

    /// Consumer loop. Each task is awaited before the next comment is taken,
    /// and `on_outcome` sees outcomes in comment order. Returns after shutdown.
    pub async fn run<F>(self: Arc<Self>, mut on_outcome: F)
    where
        F: FnMut(TaskOutcome) + Send,
    {
        debug!("Request loop started");
        while let Some((comment, scope)) = self.queue.next().await {
            let _busy = self.queue.busy_guard();
            let outcome = self.process(comment, &scope).await;
            on_outcome(outcome);
        }
        debug!("Request loop stopped");
    }

    async fn process(&self, comment: Comment, scope: &CancellationToken) -> TaskOutcome {
        let comment_id = comment.id.clone();
        self.set_current(Some(comment_id.clone()));
        self.metrics.task_started();
        self.events.emit_lossy(ChatcastEvent::AnswerTaskStarted {
            comment_id: comment_id.clone(),
            timestamp: now(),
        });

        let conversation = if self.keep_conversation {
            self.conversation_id.lock().unwrap_or_else(|p| p.into_inner()).clone()
        } else {
            None
        };

        let outcome = AnswerFetchTask::new(comment)
            .with_conversation(conversation)
            .run(&self.deps, scope)
            .await;

        if self.keep_conversation && outcome.is_completed() {
            if let Some(id) = &outcome.correlation.conversation_id {
                *self.conversation_id.lock().unwrap_or_else(|p| p.into_inner()) = Some(id.clone());
            }
        }

        let kind = outcome.kind();
        self.metrics.task_finished(kind);
        self.events.emit_lossy(ChatcastEvent::AnswerTaskFinished {
            comment_id,
            outcome: kind,
            elapsed_ms: duration_ms(outcome.elapsed),
            detail: outcome
                .error
                .as_ref()
                .filter(|e| !e.is_cancellation())
                .map(|e| e.to_string()),
            timestamp: now(),
        });
        self.set_current(None);
        outcome
    }

    fn set_current(&self, comment_id: Option<String>) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = comment_id;
    }
}
