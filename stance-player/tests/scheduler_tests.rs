//! Scheduler behaviour tests
//!
//! Drive a feed of simulated engines on tokio's paused clock and check the
//! cell state machine, reconciliation, progress and interruption handling.

mod helpers;

use std::time::Duration;

use helpers::{playing_feed, test_config, TestFeed, STEP};
use stance_common::events::{CellState, FeedEvent};
use stance_player::playback::{EngineEvent, EngineHandle, EngineStatus, SimulatedEngineFactory};
use stance_player::{ProgressStrategy, SchedulerConfig};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

// ========================================
// Activation
// ========================================

#[tokio::test(start_paused = true)]
async fn test_active_cell_buffers_then_plays() {
    let mut feed = TestFeed::new(3);
    assert_eq!(feed.state(0), CellState::ActivatingBuffering);
    assert!(feed.cell(0).is_buffering());

    feed.run_for(ms(200)).await;
    assert_eq!(feed.state(0), CellState::ActivePlaying);
    assert!(!feed.cell(0).is_buffering());
    assert!(feed.engine(0).is_playing());

    let item = feed.items[0].id;
    let transitions: Vec<(CellState, CellState)> = feed
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            FeedEvent::CellStateChanged {
                item_id,
                old_state,
                new_state,
                ..
            } if item_id == item => Some((old_state, new_state)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (CellState::Inactive, CellState::ActivatingBuffering),
            (CellState::ActivatingBuffering, CellState::ActivePlaying),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_inactive_cells_preload_without_playing() {
    let feed = playing_feed(3).await;
    for index in 1..3 {
        let stats = feed.engine(index).stats();
        assert_eq!(stats.preload_calls, 1);
        assert_eq!(stats.play_calls, 0);
        assert_eq!(feed.state(index), CellState::Inactive);
        assert!(!feed.cell(index).is_buffering());
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_active_cell_for_all_offsets() {
    let mut feed = playing_feed(6).await;

    for offset in [0.0, 40.0, 60.0, 149.0, 151.0, 330.0, 1000.0, -20.0, 220.0, 480.0] {
        feed.feed.on_scroll(offset);

        let active_cells = feed
            .feed
            .mounted_indices()
            .into_iter()
            .filter(|&index| feed.cell(index).is_active())
            .count();
        assert!(active_cells <= 1, "offset {} -> {} active cells", offset, active_cells);
        assert!(feed.playing_engines() <= 1, "offset {}", offset);

        feed.run_for(STEP * 3).await;
        assert!(feed.playing_engines() <= 1, "offset {} after ticks", offset);
    }
}

// ========================================
// Reconciliation
// ========================================

#[tokio::test(start_paused = true)]
async fn test_play_enforcement_is_idempotent() {
    let feed = playing_feed(1).await;
    let engine = feed.engine(0);
    assert!(engine.is_playing());

    let events_before = engine.stats().events_emitted;
    feed.cell(0).reconcile();
    feed.cell(0).reconcile();
    engine.play();
    engine.play();
    assert_eq!(engine.stats().events_emitted, events_before);
}

#[tokio::test(start_paused = true)]
async fn test_silent_stall_self_heals() {
    let feed = playing_feed(1).await;
    let engine = feed.engine(0);
    let plays = engine.stats().play_calls;

    engine.stall();
    assert!(!engine.is_playing());

    feed.run_for(ms(200)).await;
    assert!(engine.is_playing());
    assert!(engine.stats().play_calls > plays);
    assert_eq!(feed.state(0), CellState::ActivePlaying);
}

#[tokio::test(start_paused = true)]
async fn test_mute_converges_within_one_interval() {
    let feed = playing_feed(3).await;

    feed.feed.toggle_mute();
    feed.feed.toggle_mute();
    let muted = feed.feed.toggle_mute();
    assert!(muted);

    feed.settle(test_config().reconcile_interval() + ms(10)).await;

    for index in 0..3 {
        assert_eq!(feed.engine(index).is_muted(), feed.feed.mute().get());
        assert!(feed.cell(index).muted());
    }
}

#[tokio::test(start_paused = true)]
async fn test_mute_toggle_seeds_new_mounts_immediately() {
    let config = SchedulerConfig {
        render_window: 1,
        ..test_config()
    };
    let mut feed = TestFeed::with_config(1, config);
    feed.run_for(ms(200)).await;

    assert!(feed.feed.toggle_mute());
    // Toggling never touches a handle directly
    assert!(!feed.engine(0).is_muted());

    feed.settle(test_config().reconcile_interval() + ms(10)).await;
    assert!(feed.engine(0).is_muted());

    let mut items = feed.items.clone();
    items.extend(helpers::make_items(1));
    feed.feed.set_items(items.clone());
    feed.items = items;

    // No tick has run for the new cell yet
    assert!(feed.engine(1).is_muted());
    assert!(feed.cell(1).muted());
    assert_eq!(feed.state(1), CellState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_mute_observers_notified() {
    let feed = playing_feed(1).await;
    let mut muted_rx = feed.cell(0).subscribe_muted();
    let mut preference_rx = feed.feed.mute().subscribe();

    feed.feed.toggle_mute();
    assert!(preference_rx.has_changed().unwrap());
    assert!(*preference_rx.borrow_and_update());

    feed.settle(ms(110)).await;
    assert!(muted_rx.has_changed().unwrap());
    assert!(*muted_rx.borrow_and_update());
}

// ========================================
// Progress
// ========================================

#[tokio::test(start_paused = true)]
async fn test_deactivation_resets_progress() {
    let mut feed = playing_feed(3).await;
    feed.run_for(ms(2000)).await;
    assert!(feed.cell(0).progress() > 0.1);

    feed.scroll_to(1);

    let cell = feed.cell(0);
    assert_eq!(cell.state(), CellState::Inactive);
    assert_eq!(cell.progress(), 0.0);
    assert!(!cell.desired_playing());
    assert_eq!(*cell.subscribe_progress().borrow(), 0.0);
    assert!(!feed.engine(0).is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_late_ready_event_keeps_inactive_progress_at_zero() {
    let mut feed = playing_feed(2).await;
    feed.scroll_to(1);

    // Engine still running after the pause, then a stale ready arrives
    let engine = feed.engine(0);
    engine.play();
    engine.advance(ms(3000));
    assert!(engine.is_playing());
    feed.cell(0).handle_engine_event(&EngineEvent::StatusChange(EngineStatus::ReadyToPlay));

    let cell = feed.cell(0);
    assert_eq!(cell.state(), CellState::Inactive);
    assert!(!engine.is_playing());
    assert_eq!(cell.progress(), 0.0);
    assert_eq!(*cell.subscribe_progress().borrow(), 0.0);

    feed.run_for(ms(300)).await;
    assert_eq!(feed.cell(0).progress(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_loop_wrap_is_not_a_pause() {
    let mut feed = playing_feed(1).await;
    let engine = feed.engine(0);

    engine.seek(9.7);
    feed.cell(0).reconcile();
    assert!((feed.cell(0).progress() - 0.97).abs() < 1e-6);

    // 9.7 s + 0.5 s on a 10 s looping video lands at 0.2 s
    engine.advance(ms(500));
    assert!(engine.is_playing());
    feed.cell(0).reconcile();

    assert_eq!(feed.state(0), CellState::ActivePlaying);
    assert!(feed.cell(0).desired_playing());
    assert!(feed.cell(0).progress() < 0.05);

    feed.run_for(ms(500)).await;
    assert!(feed.cell(0).progress() > 0.0);

    let ended = feed
        .drain_events()
        .into_iter()
        .any(|event| matches!(event, FeedEvent::VideoEnded { .. }));
    assert!(!ended, "loop-wrap must not report a finished video");
}

#[tokio::test(start_paused = true)]
async fn test_sampled_progress_tracks_engine() {
    let feed = playing_feed(1).await;
    let mut rx = feed.cell(0).subscribe_progress();

    feed.run_for(ms(1000)).await;
    assert!(rx.has_changed().unwrap());
    let published = *rx.borrow_and_update();
    let engine_ratio = feed.engine(0).current_time() / feed.engine(0).duration();
    assert!(published > 0.0);
    assert!((published - engine_ratio).abs() < 0.02);
}

#[tokio::test(start_paused = true)]
async fn test_interpolated_progress_is_monotonic() {
    let config = SchedulerConfig {
        progress_strategy: ProgressStrategy::Interpolated,
        ..test_config()
    };
    let feed = TestFeed::with_config(1, config);
    feed.run_for(ms(200)).await;

    let mut last = 0.0;
    for _ in 0..40 {
        feed.run_for(STEP).await;
        let progress = feed.cell(0).progress();
        assert!(progress >= last, "{} < {}", progress, last);
        assert!(progress <= 1.0);
        last = progress;
    }
    assert!(last > 0.1);
}

// ========================================
// Manual pause
// ========================================

#[tokio::test(start_paused = true)]
async fn test_manual_pause_overrides_activity() {
    let mut feed = playing_feed(2).await;
    feed.drain_events();

    assert_eq!(feed.feed.toggle_playback(0), Some(false));
    assert_eq!(feed.state(0), CellState::ManuallyPaused);

    feed.run_for(ms(500)).await;
    assert_eq!(feed.state(0), CellState::ManuallyPaused);
    assert!(feed.cell(0).is_active());
    assert!(!feed.engine(0).is_playing());

    assert_eq!(feed.feed.toggle_playback(0), Some(true));
    assert_eq!(feed.state(0), CellState::ActivePlaying);
    assert!(feed.engine(0).is_playing());

    let flashes: Vec<bool> = feed
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            FeedEvent::PlaybackToggled { playing, .. } => Some(playing),
            _ => None,
        })
        .collect();
    assert_eq!(flashes, vec![false, true]);
}

#[tokio::test(start_paused = true)]
async fn test_tap_on_inactive_cell_is_ignored() {
    let feed = playing_feed(2).await;
    assert_eq!(feed.feed.toggle_playback(1), None);
    assert_eq!(feed.engine(1).stats().play_calls, 0);
    assert_eq!(feed.feed.toggle_playback(7), None);
}

#[tokio::test(start_paused = true)]
async fn test_manual_pause_cleared_by_scrolling_away() {
    let mut feed = playing_feed(2).await;
    feed.feed.toggle_playback(0);

    feed.scroll_to(1);
    assert_eq!(feed.state(0), CellState::Inactive);

    feed.run_for(ms(200)).await;
    feed.scroll_to(0);
    assert_eq!(feed.state(0), CellState::ActivePlaying);
    assert!(feed.engine(0).is_playing());
}

// ========================================
// Interruptions
// ========================================

#[tokio::test(start_paused = true)]
async fn test_interruption_restores_playing_intent() {
    let mut feed = playing_feed(1).await;
    let engine = feed.engine(0);

    feed.feed.set_interruption(true);
    assert_eq!(feed.state(0), CellState::Interrupted);

    // The share sheet pauses the handle itself
    engine.external_pause();
    let plays = engine.stats().play_calls;
    feed.run_for(ms(500)).await;
    assert!(!engine.is_playing());
    assert_eq!(engine.stats().play_calls, plays);
    assert_eq!(feed.feed.toggle_playback(0), None);

    feed.feed.set_interruption(false);
    assert_eq!(feed.state(0), CellState::Interrupted);

    feed.run_for(ms(200)).await;
    assert_eq!(feed.state(0), CellState::ActivePlaying);
    assert!(engine.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_interruption_keeps_manual_pause() {
    let mut feed = playing_feed(1).await;
    feed.feed.toggle_playback(0);

    feed.feed.set_interruption(true);
    feed.run_for(ms(200)).await;
    feed.feed.set_interruption(false);
    feed.run_for(ms(200)).await;

    assert_eq!(feed.state(0), CellState::ManuallyPaused);
    assert!(!feed.engine(0).is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_interruption_restore_applies_current_activity() {
    let mut feed = playing_feed(2).await;

    feed.feed.set_interruption(true);
    feed.scroll_to(1);
    // Activity changes are deferred while interrupted
    assert!(feed.playing_engines() <= 1);
    assert_eq!(feed.engine(1).stats().play_calls, 0);

    feed.feed.set_interruption(false);
    feed.run_for(ms(300)).await;

    assert_eq!(feed.state(0), CellState::Inactive);
    assert!(!feed.engine(0).is_playing());
    assert_eq!(feed.state(1), CellState::ActivePlaying);
    assert!(feed.engine(1).is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_cell_mounted_during_interruption_waits_for_restore() {
    let mut feed = playing_feed(6).await;

    feed.feed.set_interruption(true);
    feed.scroll_to(4);
    assert_eq!(feed.engine(4).stats().play_calls, 0);
    assert_eq!(feed.state(4), CellState::Interrupted);
    assert!(feed.cell(4).is_interrupted());

    feed.run_for(ms(300)).await;
    assert_eq!(feed.engine(4).stats().play_calls, 0);
    assert!(!feed.engine(4).is_playing());

    feed.feed.set_interruption(false);
    feed.run_for(ms(300)).await;
    assert!(feed.engine(4).stats().play_calls >= 1);
    assert_eq!(feed.state(4), CellState::ActivePlaying);
    assert!(feed.engine(4).is_playing());
    assert_eq!(feed.playing_engines(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_before_open_is_noop() {
    let feed = playing_feed(1).await;

    feed.cell(0).end_interruption();
    assert_eq!(feed.state(0), CellState::ActivePlaying);
    assert!(!feed.cell(0).is_interrupted());

    feed.run_for(ms(300)).await;
    assert_eq!(feed.state(0), CellState::ActivePlaying);
    assert!(feed.engine(0).is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_reopen_during_settle_cancels_restore() {
    let mut feed = playing_feed(1).await;

    feed.feed.set_interruption(true);
    feed.feed.set_interruption(false);
    feed.run_for(STEP).await;
    feed.feed.set_interruption(true);

    feed.run_for(ms(300)).await;
    assert_eq!(feed.state(0), CellState::Interrupted);

    feed.feed.set_interruption(false);
    feed.run_for(ms(200)).await;
    assert_eq!(feed.state(0), CellState::ActivePlaying);
}

// ========================================
// Errors and end of video
// ========================================

#[tokio::test(start_paused = true)]
async fn test_engine_error_surfaces_and_stops_playback_attempts() {
    let mut feed = playing_feed(3).await;
    feed.drain_events();
    let engine = feed.engine(0);
    let plays = engine.stats().play_calls;

    engine.fail("network unreachable");
    feed.run_for(ms(500)).await;

    let cell = feed.cell(0);
    assert!(cell.has_failed());
    assert!(!cell.is_buffering());
    assert!(cell.desired_playing());
    assert_eq!(cell.state(), CellState::Inactive);
    assert_eq!(engine.stats().play_calls, plays);

    let reported = feed.drain_events().into_iter().any(|event| {
        matches!(event, FeedEvent::PlaybackError { ref message, .. } if message == "network unreachable")
    });
    assert!(reported);

    // The rest of the feed keeps working
    feed.scroll_to(1);
    assert!(feed.engine(1).is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_error_while_loading_clears_buffering() {
    let feed = TestFeed::new(1);
    assert!(feed.cell(0).is_buffering());

    feed.engine(0).fail("unsupported codec");
    feed.settle(STEP).await;

    assert!(!feed.cell(0).is_buffering());
    assert!(feed.cell(0).has_failed());
}

#[tokio::test(start_paused = true)]
async fn test_video_end_reported_without_restart() {
    let factory = SimulatedEngineFactory::new(1.0, ms(100)).with_looping(false);
    let mut feed = TestFeed::build(1, test_config(), factory);

    feed.run_for(ms(1500)).await;
    let engine = feed.engine(0);
    assert!(!engine.is_playing());

    let item = feed.items[0].id;
    let ended = feed
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, FeedEvent::VideoEnded { item_id, .. } if *item_id == item))
        .count();
    assert_eq!(ended, 1);

    let plays = engine.stats().play_calls;
    feed.run_for(ms(500)).await;
    assert_eq!(engine.stats().play_calls, plays);

    // Tap replays from the start
    assert_eq!(feed.feed.toggle_playback(0), Some(true));
    assert!(engine.is_playing());
    assert!(engine.current_time() < 0.1);
}
