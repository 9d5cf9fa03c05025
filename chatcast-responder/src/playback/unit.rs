//! Playback units: a comment's validated answer, ready to play

use crate::comment::Comment;
use crate::stream::CorrelationIds;

/// Where a chunk's audio came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioLocator {
    /// Downloaded from a `voice:` reference
    Remote(String),
    /// Delivered inside the answer stream
    Inline,
}

/// Fetched, decodable audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub locator: AudioLocator,
    pub bytes: Vec<u8>,
}

/// One subtitle segment and its audio, if any could be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position within the answer
    pub index: usize,
    pub text: String,
    pub audio: Option<AudioClip>,
}

impl Chunk {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Everything needed to play one comment's answer
///
/// Owned by exactly one place at a time: the fetch task, then the playback
/// queue, then the playback loop. Dropping it releases the audio buffers.
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    pub comment: Comment,
    pub chunks: Vec<Chunk>,
    /// Full answer text as streamed
    pub answer: String,
    pub site_url: Option<String>,
    pub correlation: CorrelationIds,
}

impl PlaybackUnit {
    pub fn comment_id(&self) -> &str {
        &self.comment.id
    }

    pub fn audio_chunk_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.has_audio()).count()
    }

    /// Total buffered audio, for logging
    pub fn audio_bytes(&self) -> usize {
        self.chunks
            .iter()
            .filter_map(|c| c.audio.as_ref())
            .map(|a| a.bytes.len())
            .sum()
    }
}
