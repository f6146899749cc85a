use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use message_window::memory::{InMemorySource, RecordingView, sample_record};
use message_window::{
    ChatKind, ChatTarget, ChatWindow, FetchMode, FetchOutcome, GateDenied, JumpOutcome,
    LiveOutcome, Placement, SkipReason, WindowConfig, WindowError,
};

const CHAT: ChatTarget = ChatTarget {
    id: 7,
    kind: ChatKind::Channel,
};

fn config() -> WindowConfig {
    WindowConfig {
        page_size: 50,
        jump_poll_interval_ms: 100,
        jump_poll_attempts: 30,
        ..WindowConfig::default()
    }
}

fn spans(window: &ChatWindow) -> Vec<(u64, u64)> {
    window
        .coverage()
        .intervals()
        .iter()
        .map(|interval| (interval.oldest_id, interval.newest_id))
        .collect()
}

#[track_caller]
fn assert_ascending(view: &RecordingView) {
    let ids = view.ids();
    assert!(
        ids.windows(2).all(|pair| pair[0] < pair[1]),
        "view out of order: {ids:?}"
    );
}

fn gap_anchors(window: &ChatWindow) -> Vec<u64> {
    window
        .gap_markers()
        .iter()
        .map(|marker| marker.after_id)
        .collect()
}

#[window_test::paused_test]
async fn rendered_target_is_focused_without_fetching() {
    let source = Arc::new(InMemorySource::new().with_chat(CHAT, 1..=200));
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());
    window.open_chat(CHAT).await.unwrap();
    let issued = source.request_count();

    let outcome = window
        .jump_to(180)
        .now_or_never()
        .expect("jump to a rendered message completes without suspending");
    assert_eq!(outcome.unwrap(), JumpOutcome::AlreadyVisible);
    assert_eq!(view.focused(), vec![180]);
    assert_eq!(source.request_count(), issued);
}

#[window_test::paused_test]
async fn jump_replaces_coverage_and_waits_for_render() {
    let source = Arc::new(
        InMemorySource::new()
            .with_chat(CHAT, 1..=1_000)
            .with_latency(Duration::from_millis(10)),
    );
    let view = Arc::new(RecordingView::with_render_lag(3));
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());
    window.open_chat(CHAT).await.unwrap();
    let opened_under = window.session();

    let (outcome, pending) = tokio::join!(window.jump_to(400), async {
        tokio::time::sleep(Duration::from_millis(60)).await;
        window.pending_target()
    });

    assert_eq!(outcome.unwrap(), JumpOutcome::Focused { attempts: 4 });
    let pending = pending.expect("target pending while render lags");
    assert_eq!(pending.target_id, 400);
    assert!(pending.attempts_remaining < 30);
    assert_eq!(window.pending_target(), None);

    assert_eq!(spans(&window), vec![(375, 424)]);
    assert_eq!(view.ids(), (375..=424).collect::<Vec<_>>());
    assert_eq!(view.focused(), vec![400]);
    assert!(window.session() > opened_under);
    assert!(!window.has_reached_newest());
    assert!(!window.gate().is_ambient_suppressed());

    let request = source.requests().pop().unwrap();
    assert_eq!(request.cursor, Some(400));
    assert!(request.both_directions);
}

#[window_test::paused_test]
async fn scroll_fetches_are_held_back_during_a_jump() {
    let source = Arc::new(
        InMemorySource::new()
            .with_chat(CHAT, 1..=1_000)
            .with_latency(Duration::from_millis(20)),
    );
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());
    window.open_chat(CHAT).await.unwrap();

    let (jump, older) = tokio::join!(window.jump_to(500), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        window.load_older().await
    });
    assert_eq!(jump.unwrap(), JumpOutcome::Focused { attempts: 1 });
    assert_eq!(
        older.unwrap(),
        FetchOutcome::Skipped {
            reason: SkipReason::Gate(GateDenied::AmbientSuppressed)
        }
    );
    assert!(window.load_older().await.unwrap().is_loaded());
}

#[window_test::paused_test]
async fn concurrent_jump_reports_busy() {
    let source = Arc::new(
        InMemorySource::new()
            .with_chat(CHAT, 1..=1_000)
            .with_latency(Duration::from_millis(20)),
    );
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());
    window.open_chat(CHAT).await.unwrap();

    let (first, second) = tokio::join!(window.jump_to(300), window.jump_to(600));
    assert_eq!(first.unwrap(), JumpOutcome::Focused { attempts: 1 });
    assert_eq!(
        second.unwrap(),
        JumpOutcome::Busy {
            denied: GateDenied::InFlight(FetchMode::AroundTarget)
        }
    );
}

#[window_test::paused_test]
async fn unrendered_target_gives_up_after_bounded_polling() {
    let source = Arc::new(InMemorySource::new().with_chat(CHAT, 1..=1_000));
    let view = Arc::new(RecordingView::with_render_lag(u32::MAX));
    let window = ChatWindow::with_config(
        source.clone(),
        view.clone(),
        WindowConfig {
            jump_poll_attempts: 5,
            ..config()
        },
    );
    window.open_chat(CHAT).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = window.jump_to(250).await.unwrap_err();
    assert_eq!(
        err,
        WindowError::TargetNotFound {
            target: 250,
            attempts: 5
        }
    );
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(400) && waited < Duration::from_millis(500));
    assert!(!window.gate().is_ambient_suppressed());
    assert_eq!(window.pending_target(), None);
    assert!(view.focused().is_empty());
}

#[window_test::paused_test]
async fn failed_jump_keeps_previous_window() {
    let source = Arc::new(InMemorySource::new().with_chat(CHAT, 1..=1_000));
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());
    window.open_chat(CHAT).await.unwrap();

    source.fail_next(message_window::SourceError::Rejected {
        status: 502,
        reason: "bad gateway".into(),
    });
    let err = window.jump_to(10).await.unwrap_err();
    assert_eq!(err.mode(), Some(FetchMode::AroundTarget));
    assert_eq!(spans(&window), vec![(951, 1_000)]);
    assert_eq!(view.ids().len(), 50);
    assert!(!window.gate().is_ambient_suppressed());
    assert_eq!(window.pending_target(), None);
}

#[window_test::paused_test]
async fn live_messages_extend_the_edge() {
    let source = Arc::new(InMemorySource::new().with_chat(CHAT, 1..=100));
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());

    let early = source.post(CHAT).unwrap();
    assert_eq!(window.on_new_message(early), LiveOutcome::NoActiveChat);

    window.open_chat(CHAT).await.unwrap();
    assert_eq!(spans(&window), vec![(52, 101)]);

    let next = source.post(CHAT).unwrap();
    assert_eq!(window.on_new_message(next.clone()), LiveOutcome::Extended);
    assert_eq!(window.on_new_message(next), LiveOutcome::Duplicate);
    assert_eq!(spans(&window), vec![(52, 102)]);
    assert_eq!(view.ids().last(), Some(&102));

    let elsewhere = sample_record(ChatTarget::group(99), 103);
    assert_eq!(window.on_new_message(elsewhere), LiveOutcome::ForeignChat);
    assert!(window.gap_markers().is_empty());
}

#[window_test::paused_test]
async fn first_push_into_empty_chat_starts_coverage() {
    let source = Arc::new(InMemorySource::new().with_chat(CHAT, 1..=0));
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());

    let outcome = window.open_chat(CHAT).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Loaded { received: 0, .. }));
    assert!(window.has_reached_oldest());
    assert!(window.coverage().is_empty());

    let first = source.post(CHAT).unwrap();
    assert_eq!(window.on_new_message(first), LiveOutcome::Started);
    assert_eq!(spans(&window), vec![(1, 1)]);
}

#[window_test::paused_test]
async fn push_away_from_live_edge_surfaces_a_gap_until_backfilled() {
    let source = Arc::new(InMemorySource::new().with_chat(CHAT, 1..=200));
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());
    window.open_chat(CHAT).await.unwrap();

    window.jump_to(20).await.unwrap();
    assert_eq!(spans(&window), vec![(1, 44)]);

    let pushed = source.post(CHAT).unwrap();
    assert_eq!(pushed.id, 201);
    assert_eq!(window.on_new_message(pushed), LiveOutcome::Detached);
    assert_eq!(spans(&window), vec![(1, 44), (201, 201)]);
    assert_eq!(gap_anchors(&window), vec![44]);
    assert_ascending(&view);
    assert_eq!(view.gap_markers(), window.gap_markers());

    // Backfill goes into the gap under the visible interval, not the live edge.
    let outcome = window.load_newer(Some(40)).await.unwrap();
    assert_eq!(
        outcome,
        FetchOutcome::Loaded {
            mode: FetchMode::NewerWard,
            received: 50,
            inserted: 50
        }
    );
    assert_eq!(source.requests().last().unwrap().cursor, Some(44));
    assert_eq!(view.placements().last(), Some(&Placement::After(44)));
    assert_eq!(spans(&window), vec![(1, 94), (201, 201)]);
    assert_eq!(gap_anchors(&window), vec![94]);

    while window.gap_markers().len() == 1 {
        let outcome = window.load_newer(Some(94)).await.unwrap();
        assert!(outcome.is_loaded());
        assert_ascending(&view);
    }
    assert_eq!(spans(&window), vec![(1, 201)]);
    assert_eq!(view.ids(), (1..=201).collect::<Vec<_>>());
    assert!(window.gap_markers().is_empty());
}

#[window_test::paused_test]
async fn late_push_below_newest_lands_after_its_predecessor() {
    let source = Arc::new(InMemorySource::new().with_chat(CHAT, 1..=300));
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());
    window.open_chat(CHAT).await.unwrap();
    window.jump_to(100).await.unwrap();
    window.on_new_message(sample_record(CHAT, 300));
    assert_eq!(spans(&window), vec![(75, 124), (300, 300)]);

    assert_eq!(
        window.on_new_message(sample_record(CHAT, 200)),
        LiveOutcome::Detached
    );
    assert_eq!(view.placements().last(), Some(&Placement::After(124)));
    assert_eq!(spans(&window), vec![(75, 124), (200, 200), (300, 300)]);
    assert_eq!(gap_anchors(&window), vec![124, 200]);

    assert_eq!(
        window.on_new_message(sample_record(CHAT, 10)),
        LiveOutcome::Detached
    );
    assert_eq!(view.placements().last(), Some(&Placement::Prepend));
    assert_eq!(view.ids().first(), Some(&10));
    assert_ascending(&view);
}

#[window_test::paused_test]
async fn newer_page_across_a_detached_push_keeps_view_ordered() {
    let source = Arc::new(InMemorySource::new().with_chat(CHAT, 1..=300));
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());
    window.open_chat(CHAT).await.unwrap();
    window.jump_to(100).await.unwrap();
    assert_eq!(
        window.on_new_message(sample_record(CHAT, 200)),
        LiveOutcome::Detached
    );
    assert_ascending(&view);

    window.load_newer(Some(100)).await.unwrap();
    assert_eq!(spans(&window), vec![(75, 174), (200, 200)]);
    assert_ascending(&view);

    // This page runs from 175 to 224 and passes over the pushed 200.
    let outcome = window.load_newer(Some(150)).await.unwrap();
    assert_eq!(
        outcome,
        FetchOutcome::Loaded {
            mode: FetchMode::NewerWard,
            received: 50,
            inserted: 49
        }
    );
    assert_ascending(&view);
    assert_eq!(view.ids(), (75..=224).collect::<Vec<_>>());
    assert_eq!(spans(&window), vec![(75, 224)]);
    assert!(window.gap_markers().is_empty());

    let placements = view.placements();
    assert_eq!(
        placements[placements.len() - 2..],
        [Placement::After(174), Placement::After(200)]
    );
}

#[window_test::paused_test]
async fn push_during_initial_load_is_not_rendered_twice() {
    let source = Arc::new(
        InMemorySource::new()
            .with_chat(CHAT, 1..=100)
            .with_latency(Duration::from_millis(50)),
    );
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());

    let (opened, pushed) = tokio::join!(window.open_chat(CHAT), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let record = source.post(CHAT).unwrap();
        window.on_new_message(record)
    });
    assert_eq!(pushed, LiveOutcome::Started);
    assert_eq!(
        opened.unwrap(),
        FetchOutcome::Loaded {
            mode: FetchMode::Initial,
            received: 50,
            inserted: 49
        }
    );
    assert_eq!(spans(&window), vec![(52, 101)]);
    assert_eq!(view.ids(), (52..=101).collect::<Vec<_>>());
    assert!(window.has_reached_newest());
}

#[window_test::paused_test]
async fn far_push_during_initial_load_stays_behind_a_gap() {
    let source = Arc::new(
        InMemorySource::new()
            .with_chat(CHAT, 1..=100)
            .with_latency(Duration::from_millis(50)),
    );
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());

    let (opened, pushed) = tokio::join!(window.open_chat(CHAT), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        window.on_new_message(sample_record(CHAT, 150))
    });
    assert_eq!(pushed, LiveOutcome::Started);
    assert!(opened.unwrap().is_loaded());
    assert_ascending(&view);
    assert_eq!(view.ids().len(), 51);
    assert_eq!(view.ids().last(), Some(&150));
    assert_eq!(spans(&window), vec![(51, 100), (150, 150)]);
    assert_eq!(gap_anchors(&window), vec![100]);
}

#[window_test::paused_test]
async fn snapshot_serializes_window_state() {
    let source = Arc::new(InMemorySource::new().with_chat(CHAT, 1..=200));
    let view = Arc::new(RecordingView::new());
    let window = ChatWindow::with_config(source.clone(), view.clone(), config());
    window.open_chat(CHAT).await.unwrap();
    window.on_new_message(sample_record(CHAT, 205));

    let json = serde_json::to_value(window.snapshot()).expect("serialize snapshot");
    assert_eq!(json["chat"]["kind"], "channel");
    assert_eq!(json["coverage"][0]["oldest_id"], 151);
    assert_eq!(json["coverage"][1]["newest_id"], 205);
    assert_eq!(json["gaps"][0]["after_id"], 200);
    assert_eq!(json["has_reached_newest"], true);
}
