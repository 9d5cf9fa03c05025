//! Per-comment answer fetch task
//!
//! ```text
//! Created → Requesting → AwaitingAudio → Validating → Completed
//!              │              │              │
//!              └──────────────┴──────────────┴──→ Failed | TimedOut | Cancelled
//! ```
//!
//! The task deadline is measured from the start of [`AnswerFetchTask::run`]
//! and pre-empts every other transition, including a result that becomes
//! ready at the same instant.

use crate::client::{AnswerRequest, AnswerRequestClient};
use crate::comment::Comment;
use crate::error::{Error, Result};
use crate::fetch::audio::{fetch_chunks, AudioFetcher};
use crate::fetch::markup::plan_chunks;
use crate::playback::unit::PlaybackUnit;
use crate::stream::CorrelationIds;
use chatcast_common::events::TaskOutcomeKind;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Requesting,
    AwaitingAudio,
    Validating,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        self.outcome_kind().is_some()
    }

    pub fn outcome_kind(&self) -> Option<TaskOutcomeKind> {
        match self {
            TaskState::Completed => Some(TaskOutcomeKind::Completed),
            TaskState::Failed => Some(TaskOutcomeKind::Failed),
            TaskState::TimedOut => Some(TaskOutcomeKind::TimedOut),
            TaskState::Cancelled => Some(TaskOutcomeKind::Cancelled),
            _ => None,
        }
    }
}

/// Collaborators shared by every task
#[derive(Clone)]
pub struct TaskDeps {
    pub client: Arc<AnswerRequestClient>,
    pub fetcher: Arc<dyn AudioFetcher>,
    pub timeout: Duration,
}

/// Result of one task run
#[derive(Debug)]
pub struct TaskOutcome {
    pub comment: Comment,
    pub state: TaskState,
    /// Present only when `state == Completed`
    pub unit: Option<PlaybackUnit>,
    pub error: Option<Error>,
    pub elapsed: Duration,
    pub correlation: CorrelationIds,
    /// Every state the task passed through, in order
    pub history: Vec<TaskState>,
}

impl TaskOutcome {
    pub fn kind(&self) -> TaskOutcomeKind {
        self.state.outcome_kind().unwrap_or(TaskOutcomeKind::Failed)
    }

    pub fn is_completed(&self) -> bool {
        self.state == TaskState::Completed
    }
}

enum Finish {
    Deadline,
    Done(Result<PlaybackUnit>),
}

/// One comment's journey from text to a playable unit
pub struct AnswerFetchTask {
    comment: Comment,
    conversation_id: Option<String>,
    state: TaskState,
    history: Vec<TaskState>,
    correlation: CorrelationIds,
}

impl AnswerFetchTask {
    pub fn new(comment: Comment) -> Self {
        Self {
            comment,
            conversation_id: None,
            state: TaskState::Created,
            history: vec![TaskState::Created],
            correlation: CorrelationIds::default(),
        }
    }

    /// Continue an existing backend conversation
    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    fn transition(&mut self, next: TaskState) {
        if self.state.is_terminal() {
            return;
        }
        debug!(
            comment_id = %self.comment.id,
            author = %self.comment.author_name,
            from = ?self.state,
            to = ?next,
            "Answer task transition"
        );
        self.state = next;
        self.history.push(next);
    }

    /// Execute to a terminal state. Never panics or returns early without an outcome.
    pub async fn run(mut self, deps: &TaskDeps, cancel: &CancellationToken) -> TaskOutcome {
        let started = Instant::now();
        let work_cancel = cancel.child_token();
        let deadline = tokio::time::sleep(deps.timeout);
        tokio::pin!(deadline);

        let finish = tokio::select! {
            biased;
            _ = &mut deadline => Finish::Deadline,
            _ = cancel.cancelled() => Finish::Done(Err(Error::Cancelled)),
            unit = self.execute(deps, &work_cancel) => Finish::Done(unit),
        };
        // Stop any child work still referenced elsewhere
        work_cancel.cancel();

        let elapsed = started.elapsed();
        let (unit, error) = match finish {
            Finish::Done(Ok(unit)) => {
                self.transition(TaskState::Completed);
                info!(
                    comment_id = %self.comment.id,
                    author = %self.comment.author_name,
                    chunks = unit.chunks.len(),
                    with_audio = unit.audio_chunk_count(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Answer task completed"
                );
                (Some(unit), None)
            }
            Finish::Deadline => {
                self.transition(TaskState::TimedOut);
                warn!(
                    comment_id = %self.comment.id,
                    author = %self.comment.author_name,
                    state = ?self.history.iter().rev().nth(1),
                    timeout_ms = deps.timeout.as_millis() as u64,
                    "Answer task timed out"
                );
                (None, Some(Error::Timeout(deps.timeout)))
            }
            Finish::Done(Err(e)) if e.is_cancellation() => {
                self.transition(TaskState::Cancelled);
                debug!(comment_id = %self.comment.id, "Answer task cancelled");
                (None, Some(e))
            }
            Finish::Done(Err(e)) => {
                self.transition(TaskState::Failed);
                warn!(
                    comment_id = %self.comment.id,
                    author = %self.comment.author_name,
                    error = %e,
                    "Answer task failed"
                );
                (None, Some(e))
            }
        };

        TaskOutcome {
            comment: self.comment,
            state: self.state,
            unit,
            error,
            elapsed,
            correlation: self.correlation,
            history: self.history,
        }
    }

    async fn execute(&mut self, deps: &TaskDeps, cancel: &CancellationToken) -> Result<PlaybackUnit> {
        self.transition(TaskState::Requesting);

        if self.comment.text.trim().is_empty() {
            return Err(Error::Validation("comment text is empty".to_string()));
        }

        let request = AnswerRequest::new(self.comment.text.clone(), self.comment.author_name.clone())
            .with_conversation(self.conversation_id.clone());
        let comment_id = self.comment.id.clone();
        let answer = deps
            .client
            .send(
                &request,
                |event| trace!(comment_id = %comment_id, kind = event.kind(), "Stream event"),
                cancel,
            )
            .await;

        if !answer.success {
            return Err(answer
                .error
                .unwrap_or_else(|| Error::Internal("answer failed without detail".to_string())));
        }
        self.correlation = answer.correlation.clone();

        self.transition(TaskState::AwaitingAudio);
        let plan = plan_chunks(&answer, deps.client.base_url());
        if plan.chunks.is_empty() {
            return Err(Error::Validation("answer produced no chunks".to_string()));
        }
        let site_url = plan.site_url;
        let chunks = fetch_chunks(deps.fetcher.as_ref(), plan.chunks, cancel).await?;

        self.transition(TaskState::Validating);
        if !chunks.iter().any(|c| c.has_audio()) {
            return Err(Error::AudioFetch(format!(
                "none of {} chunks has playable audio",
                chunks.len()
            )));
        }

        Ok(PlaybackUnit {
            comment: self.comment.clone(),
            chunks,
            answer: answer.text,
            site_url,
            correlation: self.correlation.clone(),
        })
    }
}
