//! Live comments and aggregator message decoding
//!
//! The comment aggregator pushes JSON envelopes of the form
//! `{"type":"comments","data":{"comments":[{"id":..,"data":{"comment":..,"name":..}}]}}`.
//! [`decode_envelope`] turns those into [`Comment`] values in delivery order.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One chat comment, immutable once received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author_name: String,
    pub received_at: DateTime<Utc>,
}

impl Comment {
    /// New comment with a generated id, received now
    pub fn new(text: impl Into<String>, author_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            author_name: author_name.into(),
            received_at: chatcast_common::time::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct AggregatorEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: AggregatorComment,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregatorComment {
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    /// Milliseconds since the epoch, or an RFC 3339 string
    #[serde(default)]
    timestamp: Option<Value>,
}

impl AggregatorEntry {
    fn into_comment(self, default_author: &str) -> Option<Comment> {
        let text = self.data.comment.filter(|t| !t.trim().is_empty())?;

        let author_name = [self.data.display_name, self.data.name]
            .into_iter()
            .flatten()
            .find(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_author.to_string());

        let received_at = self
            .data
            .timestamp
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or_else(chatcast_common::time::now);

        let mut comment = Comment::new(text, author_name);
        comment.received_at = received_at;
        if let Some(id) = self.id.filter(|id| !id.is_empty()) {
            comment.id = id;
        }
        Some(comment)
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(chatcast_common::time::from_unix_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
            .or_else(|| s.parse::<i64>().ok().and_then(chatcast_common::time::from_unix_millis)),
        _ => None,
    }
}

/// Decode one aggregator message.
///
/// Accepts a `comments` envelope or a bare comment entry. Other message types
/// (connection notices, deletions) decode to an empty list; entries without
/// comment text are skipped.
pub fn decode_envelope(json: &str, default_author: &str) -> Result<Vec<Comment>> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| Error::Parse(format!("invalid comment message: {}", e)))?;
    decode_value(value, default_author)
}

/// [`decode_envelope`] for an already parsed value
pub fn decode_value(value: Value, default_author: &str) -> Result<Vec<Comment>> {
    let entries = if let Some(list) = value.pointer("/data/comments") {
        list.clone()
    } else if value.get("data").and_then(|d| d.get("comment")).is_some() {
        Value::Array(vec![value])
    } else {
        return Ok(Vec::new());
    };

    let entries: Vec<AggregatorEntry> = serde_json::from_value(entries)
        .map_err(|e| Error::Parse(format!("invalid comment entries: {}", e)))?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| entry.into_comment(default_author))
        .collect())
}
