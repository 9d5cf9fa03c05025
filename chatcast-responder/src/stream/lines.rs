//! Byte chunk to line reassembly
//!
//! Transport chunks arrive at arbitrary boundaries: a line, a CRLF pair or a
//! multi-byte UTF-8 sequence may be split across two chunks. Bytes are buffered
//! until a terminator arrives, so decoding only ever sees whole lines.
//!
//! A line longer than the configured limit is discarded up to its terminator
//! and counted in [`LineSplitter::take_dropped`], so a stream that never sends
//! a newline cannot grow the buffer without bound.

use tracing::warn;

/// Default longest line kept. Inline audio arrives base64 encoded on a single
/// `data:` line, so this is sized for several seconds of speech.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Incremental line splitter for `\n`, `\r\n` and bare `\r` terminated text
#[derive(Debug)]
pub struct LineSplitter {
    buf: Vec<u8>,
    /// Last byte seen was `\r`; a following `\n` belongs to the same terminator
    pending_cr: bool,
    max_line: usize,
    /// Current line exceeded `max_line`; bytes are ignored until its terminator
    discarding: bool,
    dropped: usize,
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splitter keeping lines of at most `max_line` bytes
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            pending_cr: false,
            max_line: max_line.max(1),
            discarding: false,
            dropped: 0,
        }
    }

    /// Consume a chunk and return every line it completed, without terminators
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\n' => lines.extend(self.end_line()),
                b'\r' => {
                    lines.extend(self.end_line());
                    self.pending_cr = true;
                }
                _ if self.discarding => {}
                _ if self.buf.len() >= self.max_line => {
                    warn!(max_line = self.max_line, "Stream line exceeds limit, discarding it");
                    self.buf = Vec::new();
                    self.discarding = true;
                }
                _ => self.buf.push(byte),
            }
        }

        lines
    }

    /// Flush a trailing unterminated line at end of stream
    pub fn finish(&mut self) -> Option<String> {
        self.pending_cr = false;
        if self.discarding {
            return self.end_line();
        }
        if self.buf.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    /// Number of over-long lines discarded since the last call
    pub fn take_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped)
    }

    /// Bytes buffered for the current incomplete line
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn end_line(&mut self) -> Option<String> {
        if self.discarding {
            self.discarding = false;
            self.dropped += 1;
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        // Terminators are ASCII, so a complete line never ends mid-sequence;
        // invalid input is replaced rather than rejected.
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}
