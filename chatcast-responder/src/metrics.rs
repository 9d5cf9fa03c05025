//! Pipeline counters
//!
//! Queues and tasks report through the [`PipelineMetrics`] trait; the default
//! implementation keeps lock-free atomic counters that the status endpoint
//! snapshots.

use chatcast_common::events::{DropReason, TaskOutcomeKind};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for pipeline measurements
pub trait PipelineMetrics: Send + Sync {
    fn comment_received(&self);
    fn comment_suppressed(&self);
    fn comment_dropped(&self, reason: DropReason);
    fn task_started(&self);
    fn task_finished(&self, outcome: TaskOutcomeKind);
    fn unit_queued(&self);
    fn playback_started(&self);
    fn playback_finished(&self, finished: bool);
    fn snapshot(&self) -> MetricsSnapshot;
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub comments_received: u64,
    pub comments_suppressed: u64,
    pub comments_dropped_cold_start: u64,
    pub comments_dropped_queue_full: u64,
    pub comments_dropped_empty: u64,
    pub tasks_started: u64,
    pub tasks_in_flight: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_timed_out: u64,
    pub tasks_cancelled: u64,
    pub units_queued: u64,
    pub playbacks_started: u64,
    pub playbacks_finished: u64,
    pub playbacks_interrupted: u64,
}

/// Atomic counter implementation
#[derive(Debug, Default)]
pub struct PipelineCounters {
    comments_received: AtomicU64,
    comments_suppressed: AtomicU64,
    dropped_cold_start: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_empty: AtomicU64,
    tasks_started: AtomicU64,
    tasks_in_flight: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_timed_out: AtomicU64,
    tasks_cancelled: AtomicU64,
    units_queued: AtomicU64,
    playbacks_started: AtomicU64,
    playbacks_finished: AtomicU64,
    playbacks_interrupted: AtomicU64,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineMetrics for PipelineCounters {
    fn comment_received(&self) {
        bump(&self.comments_received);
    }

    fn comment_suppressed(&self) {
        bump(&self.comments_suppressed);
    }

    fn comment_dropped(&self, reason: DropReason) {
        match reason {
            DropReason::ColdStart => bump(&self.dropped_cold_start),
            DropReason::QueueFull => bump(&self.dropped_queue_full),
            DropReason::EmptyText => bump(&self.dropped_empty),
        }
    }

    fn task_started(&self) {
        bump(&self.tasks_started);
        bump(&self.tasks_in_flight);
    }

    fn task_finished(&self, outcome: TaskOutcomeKind) {
        // Saturating: never wrap the gauge below zero
        let _ = self
            .tasks_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));

        match outcome {
            TaskOutcomeKind::Completed => bump(&self.tasks_completed),
            TaskOutcomeKind::Failed => bump(&self.tasks_failed),
            TaskOutcomeKind::TimedOut => bump(&self.tasks_timed_out),
            TaskOutcomeKind::Cancelled => bump(&self.tasks_cancelled),
        }
    }

    fn unit_queued(&self) {
        bump(&self.units_queued);
    }

    fn playback_started(&self) {
        bump(&self.playbacks_started);
    }

    fn playback_finished(&self, finished: bool) {
        if finished {
            bump(&self.playbacks_finished);
        } else {
            bump(&self.playbacks_interrupted);
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            comments_received: load(&self.comments_received),
            comments_suppressed: load(&self.comments_suppressed),
            comments_dropped_cold_start: load(&self.dropped_cold_start),
            comments_dropped_queue_full: load(&self.dropped_queue_full),
            comments_dropped_empty: load(&self.dropped_empty),
            tasks_started: load(&self.tasks_started),
            tasks_in_flight: load(&self.tasks_in_flight),
            tasks_completed: load(&self.tasks_completed),
            tasks_failed: load(&self.tasks_failed),
            tasks_timed_out: load(&self.tasks_timed_out),
            tasks_cancelled: load(&self.tasks_cancelled),
            units_queued: load(&self.units_queued),
            playbacks_started: load(&self.playbacks_started),
            playbacks_finished: load(&self.playbacks_finished),
            playbacks_interrupted: load(&self.playbacks_interrupted),
        }
    }
}
