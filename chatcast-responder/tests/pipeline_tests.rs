//! End-to-end pipeline behavior with scripted collaborators
//!
//! Tests cover:
//! - Playback order equals comment order, failed comments skipped
//! - Single-flight fetching and playback
//! - Fetching the next answer while the current one plays
//! - Independent request / playback cancellation scopes
//! - Warm-up window, suppression and queue depth limit
//! - Shutdown

mod common;

use chatcast_common::events::{ChatcastEvent, DropReason, TaskOutcomeKind};
use chatcast_responder::pipeline::SubmitOutcome;
use chatcast_responder::testing::{ScriptedResponse, SinkCall};
use common::{comment, pipeline_config, voiced_answer, wait_until, Harness};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_playback_order_matches_comment_order() {
    let h = Harness::new(&pipeline_config(), Duration::from_millis(200));
    h.controller.start();

    for i in 1..=6 {
        let id = format!("c{}", i);
        let text = format!("question {}", i);
        if i % 3 == 2 {
            h.transport.respond_to(&text, ScriptedResponse::failure("backend down"));
            h.controller.submit(comment(&id, &text));
        } else {
            h.submit_answered(&id, &text);
        }
    }

    assert!(h.sink.wait_for_chains(4, Duration::from_secs(60)).await);
    assert_eq!(h.sink.completed_ids(), vec!["c1", "c3", "c4", "c6"]);
    assert_eq!(
        h.transport.queries(),
        (1..=6).map(|i| format!("question {}", i)).collect::<Vec<_>>()
    );

    let metrics = h.controller.status().metrics;
    assert_eq!(metrics.tasks_completed, 4);
    assert_eq!(metrics.tasks_failed, 2);
    assert_eq!(metrics.playbacks_finished, 4);

    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_in_both_stages() {
    let h = Harness::new(&pipeline_config(), Duration::from_millis(300));
    h.controller.start();

    for i in 1..=4 {
        let text = format!("q{}", i);
        h.transport.respond_to(
            &text,
            voiced_answer(&h.fetcher, &format!("c{}", i), &["part a", "part b"])
                .with_chunk_delay(Duration::from_millis(50)),
        );
        h.controller.submit(comment(&format!("c{}", i), &text));
    }

    assert!(h.sink.wait_for_chains(4, Duration::from_secs(60)).await);
    assert_eq!(h.transport.streams().peak(), 1);

    // A unit's chunks never interleave with another unit's
    let mut playing: Option<String> = None;
    for call in h.sink.calls() {
        match call {
            SinkCall::ChunkStarted { comment_id, .. } => {
                if let Some(current) = &playing {
                    assert_eq!(current, &comment_id);
                }
                playing = Some(comment_id);
            }
            SinkCall::ChainCompleted { comment_id, .. } => {
                assert_eq!(playing.take(), Some(comment_id));
            }
            SinkCall::Played { .. } => assert!(playing.is_some()),
        }
    }

    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_next_answer_fetched_during_playback() {
    let h = Harness::new(&pipeline_config(), Duration::from_secs(10));
    h.controller.start();

    h.submit_answered("c1", "first");
    h.submit_answered("c2", "second");

    let controller = h.controller.clone();
    assert!(
        wait_until(
            || {
                let status = controller.status();
                status.playing && status.pending_playback == 1
            },
            Duration::from_secs(5)
        )
        .await
    );
    // c2 was fully fetched while c1 was still playing
    assert_eq!(h.sink.chains_completed(), 0);

    assert!(h.sink.wait_for_chains(2, Duration::from_secs(60)).await);
    assert_eq!(h.sink.completed_ids(), vec!["c1", "c2"]);

    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_requests_leaves_playback_running() {
    let h = Harness::new(&pipeline_config(), Duration::from_secs(10));
    h.controller.start();

    h.submit_answered("c1", "fast");
    h.transport
        .respond_to("stuck", ScriptedResponse::lines(&[]).then_hang());
    h.controller.submit(comment("c2", "stuck"));
    h.submit_answered("c3", "waiting");

    let controller = h.controller.clone();
    assert!(
        wait_until(
            || {
                let status = controller.status();
                status.playing && status.current_comment.as_deref() == Some("c2")
            },
            Duration::from_secs(5)
        )
        .await
    );

    let mut events = h.events.subscribe();
    assert_eq!(h.controller.cancel_requests(), 1);

    // c1 keeps playing to the end
    assert!(h.sink.wait_for_chains(1, Duration::from_secs(30)).await);
    assert_eq!(
        h.sink.calls().last(),
        Some(&SinkCall::ChainCompleted { comment_id: "c1".into(), finished: true })
    );
    assert!(!h.transport.queries().contains(&"waiting".to_string()));

    let mut c2_outcome = None;
    while let Ok(event) = events.try_recv() {
        if let ChatcastEvent::AnswerTaskFinished { comment_id, outcome, .. } = event {
            if comment_id == "c2" {
                c2_outcome = Some(outcome);
            }
        }
    }
    assert_eq!(c2_outcome, Some(TaskOutcomeKind::Cancelled));

    // The request stage still works after the cancel
    h.submit_answered("c4", "after cancel");
    assert!(h.sink.wait_for_chains(2, Duration::from_secs(60)).await);
    assert_eq!(h.sink.completed_ids(), vec!["c1", "c4"]);

    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_playback_leaves_fetch_running() {
    let h = Harness::new(&pipeline_config(), Duration::from_secs(30));
    h.controller.start();

    h.submit_answered("c1", "long answer");
    h.transport.respond_to(
        "slow",
        voiced_answer(&h.fetcher, "c2", &["slow reply"]).with_open_delay(Duration::from_secs(5)),
    );
    h.controller.submit(comment("c2", "slow"));

    assert!(h.sink.wait_for_calls(1, Duration::from_secs(5)).await);
    assert!(h.controller.status().fetching);

    assert_eq!(h.controller.cancel_playback(), 0);
    assert!(h.sink.wait_for_chains(1, Duration::from_secs(5)).await);
    assert_eq!(
        h.sink.calls().last(),
        Some(&SinkCall::ChainCompleted { comment_id: "c1".into(), finished: false })
    );

    // c2's fetch was untouched and its answer still plays
    assert!(h.sink.wait_for_chains(2, Duration::from_secs(120)).await);
    assert_eq!(h.sink.completed_ids(), vec!["c1", "c2"]);
    assert_eq!(h.controller.status().metrics.playbacks_interrupted, 1);

    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_clears_both_stages() {
    let h = Harness::new(&pipeline_config(), Duration::from_secs(30));
    h.controller.start();

    h.submit_answered("c1", "one");
    h.submit_answered("c2", "two");
    h.transport
        .respond_to("three", ScriptedResponse::lines(&[]).then_hang());
    h.controller.submit(comment("c3", "three"));
    h.submit_answered("c4", "four");

    let controller = h.controller.clone();
    assert!(
        wait_until(
            || {
                let status = controller.status();
                status.current_comment.as_deref() == Some("c3") && status.pending_playback == 1
            },
            Duration::from_secs(5)
        )
        .await
    );

    let summary = h.controller.cancel_all();
    assert_eq!(summary.requests_discarded, 1);
    assert_eq!(summary.playback_discarded, 1);

    assert!(h.sink.wait_for_chains(1, Duration::from_secs(5)).await);
    let controller = h.controller.clone();
    assert!(wait_until(|| !controller.status().fetching, Duration::from_secs(5)).await);

    let status = h.controller.status();
    assert_eq!(status.pending_requests, 0);
    assert_eq!(status.pending_playback, 0);
    assert!(!status.playing);
    assert_eq!(h.sink.completed_ids(), vec!["c1"]);

    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_and_suppression() {
    let mut config = pipeline_config();
    config.pipeline.cold_start_secs = 10;
    let h = Harness::new(&config, Duration::ZERO);
    h.controller.start();

    assert_eq!(
        h.controller.submit(comment("c1", "first!")),
        SubmitOutcome::Dropped { reason: DropReason::ColdStart }
    );
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(
        h.controller.submit(comment("c2", "still early")),
        SubmitOutcome::Dropped { reason: DropReason::ColdStart }
    );

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(h.controller.submit(comment("c3", "#note to self")), SubmitOutcome::Suppressed);
    assert_eq!(h.controller.submit(comment("c4", "＃全角")), SubmitOutcome::Suppressed);
    assert_eq!(
        h.controller.submit(comment("c5", "")),
        SubmitOutcome::Dropped { reason: DropReason::EmptyText }
    );

    h.transport
        .respond_to("real question", voiced_answer(&h.fetcher, "c6", &["answer"]));
    assert!(matches!(
        h.controller.submit(comment("c6", "real question")),
        SubmitOutcome::Queued { .. }
    ));

    assert!(h.sink.wait_for_chains(1, Duration::from_secs(30)).await);
    assert_eq!(h.transport.queries(), vec!["real question"]);

    let metrics = h.controller.status().metrics;
    assert_eq!(metrics.comments_received, 6);
    assert_eq!(metrics.comments_dropped_cold_start, 2);
    assert_eq!(metrics.comments_suppressed, 2);
    assert_eq!(metrics.comments_dropped_empty, 1);

    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_queue_depth_limit() {
    let mut config = pipeline_config();
    config.pipeline.max_pending_requests = 1;
    let h = Harness::new(&config, Duration::ZERO);
    h.controller.start();

    h.transport
        .respond_to("busy", ScriptedResponse::lines(&[]).then_hang());
    h.controller.submit(comment("c1", "busy"));

    let controller = h.controller.clone();
    assert!(wait_until(|| controller.status().fetching, Duration::from_secs(5)).await);

    assert_eq!(
        h.controller.submit(comment("c2", "queued")),
        SubmitOutcome::Queued { depth: 1 }
    );
    assert_eq!(
        h.controller.submit(comment("c3", "overflow")),
        SubmitOutcome::Dropped { reason: DropReason::QueueFull }
    );
    assert_eq!(h.controller.status().metrics.comments_dropped_queue_full, 1);

    h.controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_events_describe_comment_lifecycle() {
    let h = Harness::new(&pipeline_config(), Duration::ZERO);
    let mut events = h.events.subscribe();
    h.controller.start();

    h.submit_answered("c1", "hello there");
    assert!(h.sink.wait_for_chains(1, Duration::from_secs(30)).await);

    let mut types = Vec::new();
    while let Ok(event) = events.try_recv() {
        types.push(event.event_type());
    }
    assert_eq!(
        types,
        vec![
            "CommentReceived",
            "AnswerTaskStarted",
            "AnswerTaskFinished",
            "PlaybackUnitQueued",
            "PlaybackStarted",
            "SubtitleChunk",
            "PlaybackCompleted",
        ]
    );

    h.controller.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_intake() {
    let h = Harness::new(&pipeline_config(), Duration::ZERO);
    h.controller.start();
    h.controller.shutdown().await;

    assert_eq!(h.controller.submit(comment("c1", "too late")), SubmitOutcome::ShutDown);
    assert!(!h.controller.test_connection().await);
}
