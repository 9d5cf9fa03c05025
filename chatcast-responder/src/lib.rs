//! chatcast-responder
//!
//! Answers live-stream comments out loud. Each admitted comment is sent to a
//! conversational backend whose streamed answer (text plus audio) becomes a
//! playback unit; units play one at a time in comment order while the next
//! answer is already being fetched.

pub mod api;
pub mod client;
pub mod comment;
pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod pipeline;
pub mod playback;
pub mod stream;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{Error, Result};
