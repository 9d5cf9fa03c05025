//! Answer markup and chunk planning
//!
//! The backend workflow formats its answer as keyed lines:
//!
//! ```text
//! siteUrl: https://example.com/page
//! text: first sentence
//! voice: /files/tools/abc.mp3
//! text: second sentence
//! voice: /files/tools/def.mp3
//! ```
//!
//! `text:` entries become chunks in order; the n-th `voice:` path belongs to
//! the n-th non-empty text. Answers without any `text:` entry are played as a
//! single chunk using whatever inline audio the stream carried.

use crate::client::AnswerResult;

const SITE_URL_KEY: &str = "siteUrl:";
const TEXT_KEY: &str = "text:";
const VOICE_KEY: &str = "voice:";

/// Keyed content extracted from an answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerMarkup {
    pub site_url: Option<String>,
    pub texts: Vec<String>,
    /// Raw `voice:` values, unresolved
    pub voices: Vec<String>,
}

/// Audio to obtain for one planned chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAudio {
    Remote(String),
    Inline(Vec<u8>),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChunk {
    pub text: String,
    pub audio: PlannedAudio,
}

/// Chunks to fetch for one answer, in answer order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkPlan {
    pub site_url: Option<String>,
    pub chunks: Vec<PlannedChunk>,
}

enum Section {
    None,
    Text(String),
}

/// Extract keyed lines. Returns `None` when the answer has no `text:` entry.
///
/// A text value continues over following unkeyed lines until the next
/// `text:` or `voice:` line.
pub fn parse_markup(answer: &str) -> Option<AnswerMarkup> {
    let mut markup = AnswerMarkup::default();
    let mut section = Section::None;
    let mut saw_text_key = false;

    for line in answer.lines() {
        let trimmed = line.trim_start();

        if let Some(value) = trimmed.strip_prefix(TEXT_KEY) {
            close_text(&mut section, &mut markup);
            saw_text_key = true;
            section = Section::Text(value.to_string());
        } else if let Some(value) = trimmed.strip_prefix(VOICE_KEY) {
            close_text(&mut section, &mut markup);
            let value = value.trim();
            if !value.is_empty() {
                markup.voices.push(value.to_string());
            }
        } else if let Some(value) = trimmed.strip_prefix(SITE_URL_KEY) {
            close_text(&mut section, &mut markup);
            let value = value.trim();
            if markup.site_url.is_none() && !value.is_empty() {
                markup.site_url = Some(value.to_string());
            }
        } else if let Section::Text(text) = &mut section {
            text.push('\n');
            text.push_str(line);
        }
    }
    close_text(&mut section, &mut markup);

    saw_text_key.then_some(markup)
}

fn close_text(section: &mut Section, markup: &mut AnswerMarkup) {
    if let Section::Text(text) = std::mem::replace(section, Section::None) {
        let text = text.trim();
        if !text.is_empty() {
            markup.texts.push(text.to_string());
        }
    }
}

/// Resolve a `voice:` value against the backend base URL.
///
/// Absolute http(s) URLs pass through unchanged.
pub fn resolve_voice_url(base_url: &str, voice: &str) -> String {
    if voice.starts_with("http://") || voice.starts_with("https://") {
        return voice.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if voice.starts_with('/') {
        format!("{}{}", base, voice)
    } else {
        format!("{}/{}", base, voice)
    }
}

/// Decide the chunks for a finished answer
pub fn plan_chunks(result: &AnswerResult, base_url: &str) -> ChunkPlan {
    match parse_markup(&result.text) {
        Some(markup) => {
            let chunks = markup
                .texts
                .iter()
                .enumerate()
                .map(|(i, text)| PlannedChunk {
                    text: text.clone(),
                    audio: markup
                        .voices
                        .get(i)
                        .map(|voice| PlannedAudio::Remote(resolve_voice_url(base_url, voice)))
                        .unwrap_or(PlannedAudio::None),
                })
                .collect();
            ChunkPlan { site_url: markup.site_url, chunks }
        }
        None => {
            let text = result.text.trim();
            let audio = result
                .inline_audio()
                .map(PlannedAudio::Inline)
                .unwrap_or(PlannedAudio::None);

            // Audio alone still plays, with an empty subtitle
            if text.is_empty() && audio == PlannedAudio::None {
                return ChunkPlan::default();
            }
            ChunkPlan {
                site_url: None,
                chunks: vec![PlannedChunk { text: text.to_string(), audio }],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://backend.local:8080";

    fn result_with(text: &str, audio: Vec<Vec<u8>>) -> AnswerResult {
        AnswerResult {
            text: text.to_string(),
            audio_chunks: audio,
            success: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_full_markup() {
        let answer = "siteUrl: https://example.com/p\n\
                      text: first\n\
                      voice: /files/a.mp3\n\
                      text: second\n\
                      voice: /files/b.mp3\n";
        let markup = parse_markup(answer).unwrap();

        assert_eq!(markup.site_url.as_deref(), Some("https://example.com/p"));
        assert_eq!(markup.texts, vec!["first", "second"]);
        assert_eq!(markup.voices, vec!["/files/a.mp3", "/files/b.mp3"]);
    }

    #[test]
    fn test_multiline_text_and_empty_entries() {
        let answer = "text: line one\nline two\ntext:   \nvoice: /files/a.mp3\ntext: last";
        let markup = parse_markup(answer).unwrap();
        assert_eq!(markup.texts, vec!["line one\nline two", "last"]);
        assert_eq!(markup.voices, vec!["/files/a.mp3"]);
    }

    #[test]
    fn test_no_text_key_is_none() {
        assert_eq!(parse_markup("just a plain answer"), None);
        assert_eq!(parse_markup("siteUrl: https://x"), None);
    }

    #[test]
    fn test_resolve_voice_url() {
        assert_eq!(resolve_voice_url(BASE, "/files/a.mp3"), "http://backend.local:8080/files/a.mp3");
        assert_eq!(resolve_voice_url("http://h/", "files/a.mp3"), "http://h/files/a.mp3");
        assert_eq!(resolve_voice_url(BASE, "https://cdn.example/a.mp3"), "https://cdn.example/a.mp3");
    }

    #[test]
    fn test_plan_pairs_by_position() {
        let result = result_with("text: a\nvoice: /files/1.mp3\ntext: b\ntext: c\nvoice: /files/2.mp3", vec![]);
        let plan = plan_chunks(&result, BASE);

        assert_eq!(plan.chunks.len(), 3);
        assert_eq!(plan.chunks[0].audio, PlannedAudio::Remote(format!("{}/files/1.mp3", BASE)));
        // Second voice belongs to the second text, regardless of where it appeared
        assert_eq!(plan.chunks[1].audio, PlannedAudio::Remote(format!("{}/files/2.mp3", BASE)));
        assert_eq!(plan.chunks[2].audio, PlannedAudio::None);
    }

    #[test]
    fn test_plan_plain_answer_uses_inline_audio() {
        let plan = plan_chunks(&result_with("  Hello there  ", vec![vec![1, 2], vec![3]]), BASE);
        assert_eq!(
            plan.chunks,
            vec![PlannedChunk { text: "Hello there".into(), audio: PlannedAudio::Inline(vec![1, 2, 3]) }]
        );
    }

    #[test]
    fn test_plan_empty_answer_has_no_chunks() {
        assert!(plan_chunks(&result_with("   ", vec![]), BASE).chunks.is_empty());
    }
}
