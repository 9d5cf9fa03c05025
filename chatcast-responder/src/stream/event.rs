//! Typed answer-stream events

use serde::Serialize;

/// Backend identifiers attached to stream payloads
///
/// Any field may be absent on a given payload; [`CorrelationIds::merge`] keeps
/// the latest non-empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl CorrelationIds {
    pub fn is_empty(&self) -> bool {
        self.conversation_id.is_none() && self.message_id.is_none() && self.task_id.is_none()
    }

    /// Overwrite fields with any value `newer` carries
    pub fn merge(&mut self, newer: &CorrelationIds) {
        if newer.conversation_id.is_some() {
            self.conversation_id.clone_from(&newer.conversation_id);
        }
        if newer.message_id.is_some() {
            self.message_id.clone_from(&newer.message_id);
        }
        if newer.task_id.is_some() {
            self.task_id.clone_from(&newer.task_id);
        }
    }
}

/// One decoded answer-stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental answer text
    TextDelta { text: String, ids: CorrelationIds },

    /// Inline synthesized audio, already base64-decoded
    AudioChunk { bytes: Vec<u8>, ids: CorrelationIds },

    /// Any other backend event, kept for forward compatibility
    Custom {
        kind: String,
        ids: CorrelationIds,
        /// Error message for `error` events
        detail: Option<String>,
    },

    /// Backend declared the answer complete
    EndOfStream { ids: CorrelationIds },
}

impl StreamEvent {
    pub fn correlation_ids(&self) -> &CorrelationIds {
        match self {
            StreamEvent::TextDelta { ids, .. }
            | StreamEvent::AudioChunk { ids, .. }
            | StreamEvent::Custom { ids, .. }
            | StreamEvent::EndOfStream { ids } => ids,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &str {
        match self {
            StreamEvent::TextDelta { .. } => "text_delta",
            StreamEvent::AudioChunk { .. } => "audio_chunk",
            StreamEvent::Custom { kind, .. } => kind,
            StreamEvent::EndOfStream { .. } => "end_of_stream",
        }
    }

    /// Convenience constructor without correlation ids
    pub fn text(text: impl Into<String>) -> Self {
        StreamEvent::TextDelta { text: text.into(), ids: CorrelationIds::default() }
    }
}
