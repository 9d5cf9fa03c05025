//! Error types for chatcast-responder
//!
//! Defines the module error type using thiserror. Parse and per-chunk audio
//! failures are normally recovered where they happen; the remaining kinds end
//! up on a failed `AnswerResult` or a terminal task state.

use std::time::Duration;
use thiserror::Error;

/// Main error type for chatcast-responder
#[derive(Error, Debug)]
pub enum Error {
    /// Request rejected before any network activity
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid endpoint, credential or tuning value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection, stream read or protocol failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("Backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Malformed stream payload or comment message
    #[error("Parse error: {0}")]
    Parse(String),

    /// Audio resource could not be retrieved
    #[error("Audio fetch error: {0}")]
    AudioFetch(String),

    /// Wall-clock deadline exceeded
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Cancelled by its owning scope
    #[error("Operation cancelled")]
    Cancelled,

    /// Playback sink failure
    #[error("Playback error: {0}")]
    Playback(String),

    /// Shared library error (config files)
    #[error("Common error: {0}")]
    Common(#[from] chatcast_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Cancellation is control flow, not a fault
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

/// Convenience Result type using chatcast-responder Error
pub type Result<T> = std::result::Result<T, Error>;
