//! Incremental SSE line decoder
//!
//! Turns one SSE line at a time into a [`ParseOutcome`]. Each `data:` line
//! carries one complete JSON payload, so events are produced as soon as their
//! line arrives; the only state kept between calls is the `event:` name of the
//! SSE event currently being framed, cleared by the blank line that ends it.
//! An `event: message_end` with no usable `data:` line still ends the answer
//! when that blank line arrives.
//!
//! **Payload discriminators:**
//! - `message` / `agent_message` → [`StreamEvent::TextDelta`] (blank answers skipped)
//! - `tts_message` → [`StreamEvent::AudioChunk`] (base64 `audio`)
//! - `message_end` → [`StreamEvent::EndOfStream`]
//! - anything else → [`StreamEvent::Custom`]

use super::event::{CorrelationIds, StreamEvent};
use base64::Engine;
use serde_json::{Map, Value};

/// SSE field carrying payload
pub const DATA_FIELD: &str = "data:";

/// SSE field naming the event type
pub const EVENT_FIELD: &str = "event:";

/// Payload marking the end of the stream
pub const END_MARKER: &str = "[DONE]";

/// Result of feeding one line
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Event(StreamEvent),
    /// Framing, comments, keep-alives, blank answers and unknown fields
    Skipped,
    /// Termination token; nothing after it belongs to this answer
    EndMarker,
    /// Unusable payload; the caller logs it and keeps reading
    ParseError(String),
}

/// Line-oriented SSE decoder
#[derive(Debug, Default)]
pub struct StreamEventParser {
    /// Name from an `event:` line, used when the payload has no discriminator
    current_event: Option<String>,
    /// `event: message_end` framed and no end-of-stream payload decoded yet
    pending_end: bool,
}

impl StreamEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one line (terminators optional)
    pub fn feed(&mut self, raw_line: &str) -> ParseOutcome {
        let line = raw_line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            // Blank line closes the current SSE event
            self.current_event = None;
            if std::mem::take(&mut self.pending_end) {
                return ParseOutcome::Event(StreamEvent::EndOfStream {
                    ids: CorrelationIds::default(),
                });
            }
            return ParseOutcome::Skipped;
        }
        if line.trim().is_empty() || line.starts_with(':') {
            return ParseOutcome::Skipped;
        }

        if let Some(value) = line.strip_prefix(EVENT_FIELD) {
            let name = value.trim();
            self.pending_end = name == "message_end";
            self.current_event = (!name.is_empty()).then(|| name.to_string());
            return ParseOutcome::Skipped;
        }

        match line.strip_prefix(DATA_FIELD) {
            Some(payload) => {
                let outcome = self.decode_payload(payload.trim());
                if matches!(outcome, ParseOutcome::Event(StreamEvent::EndOfStream { .. })) {
                    self.pending_end = false;
                }
                outcome
            }
            // id:, retry: and unknown fields carry nothing for us
            None => ParseOutcome::Skipped,
        }
    }

    fn decode_payload(&self, payload: &str) -> ParseOutcome {
        if payload.is_empty() {
            return ParseOutcome::Skipped;
        }
        if payload == END_MARKER {
            return ParseOutcome::EndMarker;
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => return ParseOutcome::ParseError(format!("invalid JSON payload: {}", e)),
        };
        let Value::Object(object) = value else {
            return ParseOutcome::Skipped;
        };

        let kind = string_field(&object, "event")
            .or_else(|| string_field(&object, "kind"))
            .map(str::to_string)
            .or_else(|| self.current_event.clone());
        let Some(kind) = kind else {
            return ParseOutcome::Skipped;
        };

        let ids = correlation_ids(&object);
        match kind.as_str() {
            "message" | "agent_message" => {
                let answer = object.get("answer").and_then(Value::as_str).unwrap_or_default();
                if answer.trim().is_empty() {
                    ParseOutcome::Skipped
                } else {
                    ParseOutcome::Event(StreamEvent::TextDelta { text: answer.to_string(), ids })
                }
            }
            "tts_message" => {
                let encoded = object.get("audio").and_then(Value::as_str).unwrap_or_default();
                if encoded.trim().is_empty() {
                    return ParseOutcome::Skipped;
                }
                match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
                    Ok(bytes) => ParseOutcome::Event(StreamEvent::AudioChunk { bytes, ids }),
                    Err(e) => ParseOutcome::ParseError(format!("invalid base64 audio: {}", e)),
                }
            }
            "message_end" => ParseOutcome::Event(StreamEvent::EndOfStream { ids }),
            _ => {
                let detail = if kind == "error" { error_detail(&object) } else { None };
                ParseOutcome::Event(StreamEvent::Custom { kind, ids, detail })
            }
        }
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn correlation_ids(object: &Map<String, Value>) -> CorrelationIds {
    CorrelationIds {
        conversation_id: string_field(object, "conversation_id").map(str::to_string),
        message_id: string_field(object, "message_id").map(str::to_string),
        task_id: string_field(object, "task_id").map(str::to_string),
    }
}

fn error_detail(object: &Map<String, Value>) -> Option<String> {
    let message = string_field(object, "message");
    let code = string_field(object, "code");
    match (code, message) {
        (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
        (None, Some(message)) => Some(message.to_string()),
        (Some(code), None) => Some(code.to_string()),
        (None, None) => None,
    }
}

/// Parse a complete transcript and keep every well-formed event, in order.
///
/// Stops only at the `[DONE]` end marker; events after `message_end` are kept.
pub fn parse_all(raw_text: &str) -> Vec<StreamEvent> {
    let mut parser = StreamEventParser::new();
    let mut events = Vec::new();

    for line in raw_text.lines() {
        match parser.feed(line) {
            ParseOutcome::Event(event) => events.push(event),
            ParseOutcome::EndMarker => break,
            ParseOutcome::Skipped | ParseOutcome::ParseError(_) => {}
        }
    }

    events
}

/// Line statistics for a recorded transcript
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptReport {
    pub lines: usize,
    pub skipped: usize,
    pub events: usize,
    pub parse_errors: usize,
    pub text_events: usize,
    pub audio_events: usize,
    pub custom_events: usize,
    /// `error` events reported by the backend (also counted as custom)
    pub error_events: usize,
    pub end_marker_seen: bool,
    pub end_of_stream_seen: bool,
}

impl TranscriptReport {
    /// A transcript that ended cleanly and decoded without errors
    pub fn is_clean(&self) -> bool {
        self.parse_errors == 0 && (self.end_marker_seen || self.end_of_stream_seen)
    }
}

/// Feed every line of a transcript and tally the outcomes.
///
/// Unlike [`parse_all`], this keeps going after the end of the answer so that
/// trailing garbage in a fixture is visible.
pub fn validate_transcript(raw_text: &str) -> TranscriptReport {
    let mut parser = StreamEventParser::new();
    let mut report = TranscriptReport::default();

    for line in raw_text.lines() {
        report.lines += 1;
        match parser.feed(line) {
            ParseOutcome::Event(event) => {
                report.events += 1;
                match event {
                    StreamEvent::TextDelta { .. } => report.text_events += 1,
                    StreamEvent::AudioChunk { .. } => report.audio_events += 1,
                    StreamEvent::Custom { kind, .. } => {
                        report.custom_events += 1;
                        if kind == "error" {
                            report.error_events += 1;
                        }
                    }
                    StreamEvent::EndOfStream { .. } => report.end_of_stream_seen = true,
                }
            }
            ParseOutcome::Skipped => report.skipped += 1,
            ParseOutcome::EndMarker => report.end_marker_seen = true,
            ParseOutcome::ParseError(_) => report.parse_errors += 1,
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(line: &str) -> ParseOutcome {
        StreamEventParser::new().feed(line)
    }

    #[test]
    fn test_message_yields_text_delta() {
        let mut parser = StreamEventParser::new();
        let outcome = parser.feed(r#"data: {"event":"message","answer":"Hello"}"#);
        assert_eq!(outcome, ParseOutcome::Event(StreamEvent::text("Hello")));
        assert_eq!(parser.feed(""), ParseOutcome::Skipped);
    }

    #[test]
    fn test_blank_answer_skipped() {
        assert_eq!(feed(r#"data: {"event":"message","answer":""}"#), ParseOutcome::Skipped);
        assert_eq!(feed(r#"data: {"event":"message","answer":"   "}"#), ParseOutcome::Skipped);
        assert_eq!(feed(r#"data: {"event":"message"}"#), ParseOutcome::Skipped);
    }

    #[test]
    fn test_answer_whitespace_preserved() {
        let outcome = feed(r#"data: {"event":"agent_message","answer":" world"}"#);
        assert_eq!(outcome, ParseOutcome::Event(StreamEvent::text(" world")));
    }

    #[test]
    fn test_done_marker() {
        assert_eq!(feed("data: [DONE]"), ParseOutcome::EndMarker);
        assert_eq!(feed("data:[DONE]  "), ParseOutcome::EndMarker);
    }

    #[test]
    fn test_framing_lines_skipped() {
        for line in ["", "   ", ": keep-alive", "id: 42", "retry: 1000", "data:", "garbage"] {
            assert_eq!(feed(line), ParseOutcome::Skipped, "line {:?}", line);
        }
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(feed("data: {not json"), ParseOutcome::ParseError(_)));
    }

    #[test]
    fn test_non_object_or_missing_discriminator_skipped() {
        assert_eq!(feed("data: 42"), ParseOutcome::Skipped);
        assert_eq!(feed(r#"data: {"answer":"orphan"}"#), ParseOutcome::Skipped);
    }

    #[test]
    fn test_tts_message_decodes_audio() {
        // "RIFF" in base64
        let outcome = feed(r#"data: {"event":"tts_message","audio":"UklGRg==","message_id":"m1"}"#);
        match outcome {
            ParseOutcome::Event(StreamEvent::AudioChunk { bytes, ids }) => {
                assert_eq!(bytes, b"RIFF");
                assert_eq!(ids.message_id.as_deref(), Some("m1"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_tts_message_bad_base64_is_parse_error() {
        let outcome = feed(r#"data: {"event":"tts_message","audio":"!!!not-base64"}"#);
        assert!(matches!(outcome, ParseOutcome::ParseError(_)));
    }

    #[test]
    fn test_message_end_carries_ids() {
        let outcome = feed(r#"data: {"event":"message_end","conversation_id":"c1","message_id":"m1"}"#);
        match outcome {
            ParseOutcome::Event(StreamEvent::EndOfStream { ids }) => {
                assert_eq!(ids.conversation_id.as_deref(), Some("c1"));
                assert_eq!(ids.message_id.as_deref(), Some("m1"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_event_field_message_end_takes_ids_from_data() {
        let mut parser = StreamEventParser::new();
        assert_eq!(parser.feed("event: message_end"), ParseOutcome::Skipped);

        match parser.feed(r#"data: {"conversation_id":"c9","message_id":"m9"}"#) {
            ParseOutcome::Event(StreamEvent::EndOfStream { ids }) => {
                assert_eq!(ids.conversation_id.as_deref(), Some("c9"));
                assert_eq!(ids.message_id.as_deref(), Some("m9"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        // Already ended by the payload; the blank line only closes the event
        assert_eq!(parser.feed(""), ParseOutcome::Skipped);
    }

    #[test]
    fn test_event_field_message_end_without_data() {
        let mut parser = StreamEventParser::new();
        assert_eq!(parser.feed("event: message_end"), ParseOutcome::Skipped);
        assert_eq!(
            parser.feed(""),
            ParseOutcome::Event(StreamEvent::EndOfStream { ids: CorrelationIds::default() })
        );
        assert_eq!(parser.feed(""), ParseOutcome::Skipped);
    }

    #[test]
    fn test_event_field_message_end_with_bad_data_still_ends() {
        let mut parser = StreamEventParser::new();
        parser.feed("event: message_end");
        assert!(matches!(parser.feed("data: {broken"), ParseOutcome::ParseError(_)));
        assert!(matches!(
            parser.feed(""),
            ParseOutcome::Event(StreamEvent::EndOfStream { .. })
        ));
    }

    #[test]
    fn test_event_field_names_untyped_payload_until_blank_line() {
        let mut parser = StreamEventParser::new();
        assert_eq!(parser.feed("event: message"), ParseOutcome::Skipped);
        assert_eq!(
            parser.feed(r#"data: {"answer":"named"}"#),
            ParseOutcome::Event(StreamEvent::text("named"))
        );
        assert_eq!(parser.feed(""), ParseOutcome::Skipped);
        assert_eq!(parser.feed(r#"data: {"answer":"named"}"#), ParseOutcome::Skipped);
    }

    #[test]
    fn test_unknown_event_is_custom() {
        let outcome = feed(r#"data: {"event":"workflow_started","task_id":"t1"}"#);
        match outcome {
            ParseOutcome::Event(StreamEvent::Custom { kind, ids, detail }) => {
                assert_eq!(kind, "workflow_started");
                assert_eq!(ids.task_id.as_deref(), Some("t1"));
                assert!(detail.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_error_event_detail() {
        let outcome = feed(r#"data: {"event":"error","code":"quota_exceeded","message":"limit hit"}"#);
        match outcome {
            ParseOutcome::Event(StreamEvent::Custom { detail, .. }) => {
                assert_eq!(detail.as_deref(), Some("quota_exceeded: limit hit"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_parse_all_stops_at_done() {
        let transcript = "data: {\"event\":\"message\",\"answer\":\"a\"}\n\n\
                          data: [DONE]\n\n\
                          data: {\"event\":\"message\",\"answer\":\"late\"}\n";
        assert_eq!(parse_all(transcript), vec![StreamEvent::text("a")]);
    }

    #[test]
    fn test_parse_all_keeps_events_after_message_end() {
        let transcript = "data: {\"event\":\"message\",\"answer\":\"a\"}\n\n\
                          data: {\"event\":\"message_end\"}\n\n\
                          data: {\"event\":\"message\",\"answer\":\"b\"}\n\n";
        let events = parse_all(transcript);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::text("a"));
        assert!(matches!(events[1], StreamEvent::EndOfStream { .. }));
        assert_eq!(events[2], StreamEvent::text("b"));
    }

    #[test]
    fn test_validate_transcript_counts() {
        let transcript = ": ping\n\
                          data: {\"event\":\"message\",\"answer\":\"x\"}\n\
                          data: {oops\n\
                          data: {\"event\":\"tts_message\",\"audio\":\"UklGRg==\"}\n\
                          data: {\"event\":\"message_end\"}\n";
        let report = validate_transcript(transcript);

        assert_eq!(report.lines, 5);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.events, 3);
        assert_eq!(report.text_events, 1);
        assert_eq!(report.audio_events, 1);
        assert_eq!(report.parse_errors, 1);
        assert_eq!(report.error_events, 0);
        assert!(report.end_of_stream_seen);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_validate_transcript_counts_error_events() {
        let transcript = "data: {\"event\":\"message\",\"answer\":\"x\"}\n\
                          data: {\"event\":\"error\",\"code\":\"invalid_param\",\"message\":\"bad\"}\n\
                          data: {\"event\":\"workflow_finished\"}\n\
                          data: {\"event\":\"error\",\"message\":\"again\"}\n\
                          data: [DONE]\n";
        let report = validate_transcript(transcript);

        assert_eq!(report.custom_events, 3);
        assert_eq!(report.error_events, 2);
        assert!(report.end_marker_seen);
        assert!(report.is_clean());
    }
}
