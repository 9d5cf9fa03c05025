//! Answer stream decoding
//!
//! Bytes from the transport pass through [`LineSplitter`] and then
//! [`StreamEventParser`], producing [`StreamEvent`]s in arrival order.

pub mod event;
pub mod lines;
pub mod parser;

pub use event::{CorrelationIds, StreamEvent};
pub use lines::{LineSplitter, MAX_LINE_BYTES};
pub use parser::{parse_all, validate_transcript, ParseOutcome, StreamEventParser, TranscriptReport};
