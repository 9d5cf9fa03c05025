//! Event types for the chatcast event system
//!
//! Provides the shared event definitions and the EventBus used to fan pipeline
//! activity out to SSE clients, loggers and tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Pipeline stage addressed by a cancellation or queue change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Comment intake and answer generation
    Requests,
    /// Ordered audio playback
    Playback,
}

/// Why an incoming comment never reached the request queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Arrived inside the warm-up window after the first comment
    ColdStart,
    /// Request queue was at its configured depth
    QueueFull,
    /// Comment carried no usable text
    EmptyText,
}

/// Terminal state of one answer fetch task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcomeKind {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl TaskOutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcomeKind::Completed => "completed",
            TaskOutcomeKind::Failed => "failed",
            TaskOutcomeKind::TimedOut => "timed_out",
            TaskOutcomeKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskOutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chatcast event types
///
/// Events are broadcast via EventBus and serialized as-is for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatcastEvent {
    /// Comment accepted by the pipeline and queued for an answer
    CommentReceived {
        comment_id: String,
        author_name: String,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Comment started with a suppression sentinel and was skipped
    CommentSuppressed {
        comment_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Comment was not admitted
    CommentDropped {
        comment_id: String,
        reason: DropReason,
        timestamp: DateTime<Utc>,
    },

    /// An answer fetch task began executing
    AnswerTaskStarted {
        comment_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An answer fetch task reached a terminal state
    AnswerTaskFinished {
        comment_id: String,
        outcome: TaskOutcomeKind,
        elapsed_ms: u64,
        /// Failure detail, absent on success
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A validated playback unit joined the playback queue
    PlaybackUnitQueued {
        comment_id: String,
        chunk_count: usize,
        queue_depth: usize,
        timestamp: DateTime<Utc>,
    },

    /// Playback of a unit began
    PlaybackStarted {
        comment_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A chunk's subtitle text should be shown now
    SubtitleChunk {
        comment_id: String,
        index: usize,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Playback of a unit finished (normally or not)
    PlaybackCompleted {
        comment_id: String,
        /// False when the unit was cut short by cancellation or a sink failure
        finished: bool,
        timestamp: DateTime<Utc>,
    },

    /// A stage's queue was emptied by cancellation
    QueueCleared {
        stage: PipelineStage,
        discarded: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ChatcastEvent {
    /// Event type string, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatcastEvent::CommentReceived { .. } => "CommentReceived",
            ChatcastEvent::CommentSuppressed { .. } => "CommentSuppressed",
            ChatcastEvent::CommentDropped { .. } => "CommentDropped",
            ChatcastEvent::AnswerTaskStarted { .. } => "AnswerTaskStarted",
            ChatcastEvent::AnswerTaskFinished { .. } => "AnswerTaskFinished",
            ChatcastEvent::PlaybackUnitQueued { .. } => "PlaybackUnitQueued",
            ChatcastEvent::PlaybackStarted { .. } => "PlaybackStarted",
            ChatcastEvent::SubtitleChunk { .. } => "SubtitleChunk",
            ChatcastEvent::PlaybackCompleted { .. } => "PlaybackCompleted",
            ChatcastEvent::QueueCleared { .. } => "QueueCleared",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lag and lose
/// the oldest events; emitters never block.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatcastEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use chatcast_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatcastEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ChatcastEvent,
    ) -> Result<usize, broadcast::error::SendError<ChatcastEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ChatcastEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
