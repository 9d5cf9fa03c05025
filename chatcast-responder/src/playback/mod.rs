//! Playback stage: units, the ordered queue, and output sinks

pub mod queue;
pub mod sink;
pub mod unit;

pub use queue::{PlaybackGaps, PlaybackQueue};
pub use sink::{probe_duration, PlaybackSink, SubtitleSink};
pub use unit::{AudioClip, AudioLocator, Chunk, PlaybackUnit};
