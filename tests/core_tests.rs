mod common;

use common::*;
use reel_feed::{FeedEvent, HasPlaybackState, LoadState, MediaStatus};
use std::time::Duration;

async fn loaded(ids: &[&str]) -> Harness {
    let mut harness = Harness::new(items(ids), ScriptedBackend::accepting(), true);
    harness.session.load_feed().await.unwrap();
    harness.observe_all();
    settle().await;
    harness
}

// Loading activates the first item directly
#[tokio::test]
async fn test_first_item_plays_after_load() {
    let harness = loaded(&["a", "b", "c"]).await;

    assert_eq!(harness.session.active_index(), Some(0));
    assert_eq!(harness.session.current_active_item_id(), Some("a"));
    assert!(harness.session.is_playing());
    assert!(harness.session.is_muted());
    assert_eq!(harness.transport.log(), vec!["start:a:muted"]);
    assert_eq!(harness.session.load_state(), &LoadState::Loaded);
}

// Scroll makes item[1] dominant: it becomes active, item[0] is stopped first
#[tokio::test]
async fn test_visibility_switches_active_item() {
    let mut harness = loaded(&["a", "b", "c"]).await;
    let viewport = harness.session.viewport();

    assert!(viewport.report("b", 0.8).is_some());
    harness.session.process_pending().await;
    settle().await;

    assert_eq!(harness.session.active_index(), Some(1));
    assert_eq!(harness.transport.count("start:b:muted"), 1);
    assert_eq!(
        harness.transport.log(),
        vec!["start:a:muted", "stop:a", "start:b:muted"]
    );
    assert!(harness.session.is_playing());
    assert_eq!(harness.transport.max_engaged(), 1);
}

#[tokio::test]
async fn test_visibility_below_threshold_is_ignored() {
    let mut harness = loaded(&["a", "b"]).await;
    let viewport = harness.session.viewport();

    assert!(viewport.report("b", 0.5).is_none());
    harness.session.process_pending().await;

    assert_eq!(harness.session.active_index(), Some(0));
    assert_eq!(harness.transport.log(), vec!["start:a:muted"]);
}

// Pressing "down" only requests a scroll; the visibility report does the switch
#[tokio::test]
async fn test_next_requests_scroll_without_playing() {
    let mut harness = loaded(&["a", "b", "c"]).await;

    assert!(harness.session.next().await);
    settle().await;

    assert_eq!(
        *harness.view.scrolls.lock().unwrap(),
        vec![(1, "b".to_string())]
    );
    assert_eq!(harness.session.active_index(), Some(0));
    assert_eq!(harness.transport.count("start:b:muted"), 0);

    harness.session.viewport().report("b", 0.8);
    harness.session.process_pending().await;
    settle().await;

    assert_eq!(harness.session.active_index(), Some(1));
    assert_eq!(harness.transport.count("start:b:muted"), 1);
}

#[tokio::test]
async fn test_navigation_bounds() {
    let mut harness = loaded(&["a", "b"]).await;

    assert!(!harness.session.previous().await);
    assert!(harness.session.next().await);
    // Target is already the last item
    assert!(!harness.session.next().await);
    assert!(harness.session.previous().await);

    assert_eq!(
        *harness.view.scrolls.lock().unwrap(),
        vec![(1, "b".to_string()), (0, "a".to_string())]
    );
}

#[tokio::test]
async fn test_repeated_next_steps_from_pending_target() {
    let mut harness = loaded(&["a", "b", "c", "d"]).await;

    harness.session.next().await;
    harness.session.next().await;

    let scrolls = harness.view.scrolls.lock().unwrap().clone();
    assert_eq!(scrolls, vec![(1, "b".to_string()), (2, "c".to_string())]);
}

// A click opens the detail view and never changes the active item
#[tokio::test]
async fn test_open_does_not_change_active_item() {
    let mut harness = loaded(&["a", "b", "c"]).await;
    let mut events = harness.session.event_receiver();

    assert!(harness.session.open("c").await);
    assert!(!harness.session.open("missing").await);

    assert_eq!(*harness.navigator.opened.lock().unwrap(), vec!["c".to_string()]);
    assert_eq!(harness.session.active_index(), Some(0));
    let emitted = drain_events(&mut events);
    assert!(emitted
        .iter()
        .any(|e| matches!(e, FeedEvent::DetailRequested { item_id } if item_id == "c")));
    assert!(!emitted
        .iter()
        .any(|e| matches!(e, FeedEvent::ActiveItemChanged { .. })));
}

// Two items crossing in one batch: the later report wins
#[tokio::test]
async fn test_batch_last_event_wins() {
    let mut harness = loaded(&["a", "b", "c"]).await;

    let emitted = harness
        .session
        .viewport()
        .report_batch(&[("b", 0.8), ("c", 0.9)]);
    assert_eq!(emitted, 2);
    harness.session.process_pending().await;
    settle().await;

    assert_eq!(harness.session.current_active_item_id(), Some("c"));
    assert_eq!(harness.transport.engaged().len(), 1);
    assert!(harness.transport.engaged().contains("c"));
    assert_eq!(harness.transport.max_engaged(), 1);
}

#[tokio::test]
async fn test_autoplay_refusal_falls_back_to_muted() {
    let mut settings = test_settings();
    settings.start_muted = false;
    let mut harness =
        Harness::with_settings(items(&["a", "b"]), ScriptedBackend::accepting(), true, settings);
    harness.transport.reject_unmuted();
    let mut events = harness.session.event_receiver();

    harness.session.load_feed().await.unwrap();
    settle().await;

    assert_eq!(
        harness.transport.log(),
        vec!["start:a:sound", "start:a:muted"]
    );
    assert!(harness.session.is_playing());
    assert!(harness.session.is_muted());
    // Recovered silently
    assert!(notices(&mut events).is_empty());
}

#[tokio::test]
async fn test_failed_start_leaves_item_paused() {
    let mut harness = Harness::new(items(&["a"]), ScriptedBackend::accepting(), true);
    harness.transport.fail_all();
    let mut events = harness.session.event_receiver();

    harness.session.load_feed().await.unwrap();
    settle().await;

    let snapshot = harness.session.playback_receiver().borrow().clone();
    assert_eq!(snapshot.status, MediaStatus::Paused);
    assert_eq!(snapshot.active_item_id.as_deref(), Some("a"));
    assert!(notices(&mut events).is_empty());
}

// A start that completes after the viewer moved on must not leave two items playing
#[tokio::test(start_paused = true)]
async fn test_late_start_is_stopped_after_switch() {
    let mut harness = Harness::new(items(&["a", "b"]), ScriptedBackend::accepting(), true);
    harness.transport.delay_start("a", Duration::from_millis(500));
    harness.session.load_feed().await.unwrap();
    harness.observe_all();

    let snapshot = harness.session.playback_receiver().borrow().clone();
    assert_eq!(snapshot.status, MediaStatus::Starting);

    harness.session.viewport().report("b", 0.9);
    harness.session.process_pending().await;
    settle().await;
    assert_eq!(harness.session.current_active_item_id(), Some("b"));
    assert!(harness.session.is_playing());

    tokio::time::sleep(Duration::from_secs(1)).await;
    settle().await;

    assert!(harness.session.is_playing());
    assert_eq!(harness.session.current_active_item_id(), Some("b"));
    assert_eq!(harness.transport.count("stop:a"), 2);
    assert_eq!(harness.transport.engaged().len(), 1);
    assert_eq!(harness.transport.max_engaged(), 1);
}

#[tokio::test]
async fn test_toggle_play_pause() {
    let mut harness = loaded(&["a", "b"]).await;

    assert!(harness.session.toggle_play_pause().await.is_none());
    let snapshot = harness.session.playback_receiver().borrow().clone();
    assert!(snapshot.is_paused());
    assert_eq!(harness.transport.count("stop:a"), 1);

    let resumed = harness.session.toggle_play_pause().await.unwrap();
    assert_eq!(resumed.await.unwrap(), MediaStatus::Playing);
    assert!(harness.session.is_playing());
    assert_eq!(harness.transport.count("start:a:muted"), 2);
}

#[tokio::test]
async fn test_set_muted_applies_to_active_item() {
    let mut harness = loaded(&["a"]).await;

    harness.session.set_muted(false).await;
    assert!(!harness.session.is_muted());
    harness.session.set_muted(false).await;

    assert_eq!(harness.transport.count("mute:a:false"), 1);
}

#[tokio::test]
async fn test_reload_keeps_active_item() {
    let mut harness = loaded(&["a", "b", "c"]).await;
    harness.session.viewport().report("b", 0.8);
    harness.session.process_pending().await;
    settle().await;

    *harness.source.items.lock().unwrap() = items(&["x", "b", "c"]);
    harness.session.load_feed().await.unwrap();
    settle().await;

    assert_eq!(harness.session.current_active_item_id(), Some("b"));
    assert_eq!(harness.transport.count("start:b:muted"), 1);
}

#[tokio::test]
async fn test_reload_keeps_paused_item_paused() {
    let mut harness = loaded(&["a", "b"]).await;
    assert!(harness.session.toggle_play_pause().await.is_none());

    harness.session.load_feed().await.unwrap();
    settle().await;

    assert_eq!(harness.session.current_active_item_id(), Some("a"));
    assert!(harness.session.playback_receiver().borrow().is_paused());
    assert_eq!(harness.transport.count("start:a:muted"), 1);
    assert!(harness.transport.engaged().is_empty());
}

#[tokio::test]
async fn test_reload_without_active_item_falls_back_to_first() {
    let mut harness = loaded(&["a", "b"]).await;

    *harness.source.items.lock().unwrap() = items(&["x", "y"]);
    harness.session.load_feed().await.unwrap();
    settle().await;

    assert_eq!(harness.session.current_active_item_id(), Some("x"));
    assert_eq!(harness.transport.engaged().len(), 1);
}

#[tokio::test]
async fn test_empty_feed_leaves_nothing_active() {
    let mut harness = loaded(&["a"]).await;

    *harness.source.items.lock().unwrap() = Vec::new();
    assert_eq!(harness.session.load_feed().await.unwrap(), 0);

    assert_eq!(harness.session.active_index(), None);
    assert!(harness.session.playback_receiver().borrow().is_idle());
    assert!(harness.transport.engaged().is_empty());
    assert!(!harness.session.next().await);
}

#[tokio::test]
async fn test_failed_load_is_retryable() {
    let mut harness = Harness::new(items(&["a"]), ScriptedBackend::accepting(), true);
    harness
        .source
        .fail_feed
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let mut events = harness.session.event_receiver();

    assert!(harness.session.load_feed().await.is_err());
    assert_eq!(
        harness.session.load_state(),
        &LoadState::Failed("Failed to load videos. Please try again later.".to_string())
    );
    let shown = notices(&mut events);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].message, "Failed to load videos. Please try again later.");
    assert_eq!(harness.session.active_index(), None);

    harness
        .source
        .fail_feed
        .store(false, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(harness.session.load_feed().await.unwrap(), 1);
    assert_eq!(harness.session.load_state(), &LoadState::Loaded);
}

#[tokio::test]
async fn test_item_view_reflects_active_and_like_state() {
    let harness = loaded(&["a", "b"]).await;

    let view = harness.session.item_view("a").unwrap();
    assert!(view.is_active);
    assert!(!view.liked);
    assert!(!harness.session.item_view("b").unwrap().is_active);
    assert!(harness.session.item_view("zzz").is_none());
}

// The spawned loop processes handle commands and viewport reports in order
#[tokio::test]
async fn test_spawned_session_round_trip() {
    let harness = loaded(&["a", "b", "c"]).await;
    let transport = harness.transport.clone();
    let view = harness.view.clone();
    let handle = harness.session.spawn();
    let mut playback = handle.playback_receiver();

    handle.next().unwrap();
    handle.viewport().report("b", 0.85);

    tokio::time::timeout(
        Duration::from_secs(5),
        playback.wait_for(|s| s.active_item_id.as_deref() == Some("b") && s.is_playing()),
    )
    .await
    .expect("switch to b")
    .unwrap();

    assert_eq!(*view.scrolls.lock().unwrap(), vec![(1, "b".to_string())]);
    assert_eq!(handle.current_active_item_id().as_deref(), Some("b"));

    handle.shutdown().await.unwrap();
    assert!(handle.playback().is_idle());
    assert!(transport.engaged().is_empty());
    assert!(handle.next().is_err());
}
