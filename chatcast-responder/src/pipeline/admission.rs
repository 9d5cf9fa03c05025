//! Comment admission: warm-up window and suppression sentinels

use crate::comment::Comment;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// Inside the warm-up window that starts with the first comment
    ColdStart { remaining: Duration },
    /// Starts with a suppression sentinel
    Suppressed,
    EmptyText,
}

/// Decides which comments reach the request queue
#[derive(Debug)]
pub struct AdmissionFilter {
    cold_start: Duration,
    suppress_prefixes: Vec<String>,
    first_seen: Mutex<Option<Instant>>,
    window_end_logged: Mutex<bool>,
}

impl AdmissionFilter {
    pub fn new(cold_start: Duration, suppress_prefixes: Vec<String>) -> Self {
        Self {
            cold_start,
            suppress_prefixes,
            first_seen: Mutex::new(None),
            window_end_logged: Mutex::new(false),
        }
    }

    /// Evaluate a comment now. The first call starts the warm-up window.
    pub fn evaluate(&self, comment: &Comment) -> Admission {
        self.evaluate_at(comment, Instant::now())
    }

    fn evaluate_at(&self, comment: &Comment, now: Instant) -> Admission {
        if !self.cold_start.is_zero() {
            let first = {
                let mut first_seen = self.first_seen.lock().unwrap_or_else(|p| p.into_inner());
                *first_seen.get_or_insert_with(|| {
                    info!(
                        comment_id = %comment.id,
                        window_secs = self.cold_start.as_secs_f64(),
                        "First comment received, warm-up window started"
                    );
                    now
                })
            };

            let elapsed = now.saturating_duration_since(first);
            if elapsed < self.cold_start {
                let remaining = self.cold_start - elapsed;
                debug!(
                    comment_id = %comment.id,
                    remaining_ms = remaining.as_millis() as u64,
                    "Comment dropped during warm-up window"
                );
                return Admission::ColdStart { remaining };
            }

            let mut logged = self.window_end_logged.lock().unwrap_or_else(|p| p.into_inner());
            if !*logged {
                *logged = true;
                info!("Warm-up window over, answering comments");
            }
        }

        let text = comment.text.trim_start();
        if text.is_empty() {
            return Admission::EmptyText;
        }
        if self.is_suppressed(text) {
            debug!(comment_id = %comment.id, "Comment suppressed by sentinel prefix");
            return Admission::Suppressed;
        }
        Admission::Admit
    }

    /// Leading whitespace is ignored
    pub fn is_suppressed(&self, text: &str) -> bool {
        let text = text.trim_start();
        self.suppress_prefixes.iter().any(|p| !p.is_empty() && text.starts_with(p.as_str()))
    }
}
