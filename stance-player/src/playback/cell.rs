//! Playback cell controller
//!
//! One cell owns one engine handle and keeps engine truth converged toward
//! its intent (`desired_playing`), the shared mute preference, and the
//! progress readout. Inputs arrive from three unordered sources (the feed
//! calling `set_active`/`toggle_playback`, engine events, and the
//! reconcile tick), so every mutation below is idempotent.
//!
//! # State machine
//!
//! ```text
//! Inactive ──activate──▶ ActivatingBuffering ──ready──▶ ActivePlaying
//!    ▲                                                   │      ▲
//!    └──────────────deactivate (pause, progress = 0)─────┘      │
//!                                          tap ▼                │ tap
//!                                         ManuallyPaused ───────┘
//! any ──interruption open──▶ Interrupted ──close + settle──▶ restore
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use stance_common::events::{CellState, EventBus, FeedEvent};

use super::engine::{EngineEvent, EngineHandle, EngineStatus};
use super::interruption::{CapturedIntent, InterruptionGuard};
use super::mute::MuteState;
use super::progress::{ProgressAnimator, SampleOutcome};
use super::reconcile;
use super::types::{CellSnapshot, FeedItem};
use crate::config::SchedulerConfig;
use crate::error::Error;

/// Mutable scheduler state of one cell
struct CellInner {
    state: CellState,
    is_active: bool,
    desired_playing: bool,
    buffering: bool,
    failed: bool,
    /// Non-looping playthrough finished; self-heal must not restart it
    ended: bool,
    interruption: InterruptionGuard,
    progress: ProgressAnimator,
    settle_task: Option<JoinHandle<()>>,
}

/// State shared between a cell and its background tasks
pub(super) struct CellShared {
    item: FeedItem,
    engine: Arc<dyn EngineHandle>,
    mute: MuteState,
    bus: EventBus,
    config: SchedulerConfig,
    runtime: Handle,
    alive: AtomicBool,
    inner: Mutex<CellInner>,
    progress_tx: watch::Sender<f64>,
    muted_tx: watch::Sender<bool>,
}

/// Scheduler for one mounted feed item
///
/// Dropping the cell unmounts it.
pub struct PlaybackCell {
    shared: Arc<CellShared>,
    task: Option<JoinHandle<()>>,
}

impl PlaybackCell {
    /// Mount a cell around a freshly created engine handle
    ///
    /// The handle's mute flag is seeded from `mute` before anything else
    /// happens. An active cell starts playback immediately; an inactive one
    /// pre-buffers when `preload_inactive` is set. A cell mounted while an
    /// interruption is open only records `is_active`; playback starts after
    /// the window closes and settles. Must be called with a runtime handle
    /// the reconcile task can be spawned on.
    #[allow(clippy::too_many_arguments)]
    pub fn mount(
        item: FeedItem,
        engine: Arc<dyn EngineHandle>,
        mute: MuteState,
        bus: EventBus,
        config: SchedulerConfig,
        is_active: bool,
        interrupted: bool,
        runtime: &Handle,
    ) -> Self {
        let muted = mute.get();
        engine.set_muted(muted);
        // Subscribe before issuing any command so no event is missed
        let events = engine.subscribe();

        let (progress_tx, _) = watch::channel(0.0);
        let (muted_tx, _) = watch::channel(muted);
        let progress = ProgressAnimator::new(
            config.progress_strategy,
            config.loop_wrap_high,
            config.loop_wrap_low,
        );

        let shared = Arc::new(CellShared {
            item,
            engine,
            mute,
            bus,
            config,
            runtime: runtime.clone(),
            alive: AtomicBool::new(true),
            inner: Mutex::new(CellInner {
                state: CellState::Inactive,
                is_active,
                desired_playing: false,
                buffering: false,
                failed: false,
                ended: false,
                interruption: InterruptionGuard::new(),
                progress,
                settle_task: None,
            }),
            progress_tx,
            muted_tx,
        });

        debug!(
            "Mounting cell for item {} (active={}, muted={}, interrupted={})",
            shared.item.id, is_active, muted, interrupted
        );

        {
            let mut inner = shared.lock();
            if interrupted {
                // No prior intent; the restore starts playback if still active
                let intent = CapturedIntent {
                    was_playing: false,
                    was_active: false,
                };
                inner.interruption.open(intent);
                shared.transition(&mut inner, CellState::Interrupted);
                if shared.config.preload_inactive {
                    shared.engine.preload();
                }
            } else if is_active {
                shared.activate(&mut inner);
            } else if shared.config.preload_inactive {
                shared.engine.preload();
            }
        }

        let task = reconcile::spawn_reconcile_task(runtime, Arc::clone(&shared), events);
        Self {
            shared,
            task: Some(task),
        }
    }

    pub fn item(&self) -> &FeedItem {
        &self.shared.item
    }

    pub fn item_id(&self) -> Uuid {
        self.shared.item.id
    }

    /// Engine handle owned by this cell
    pub fn engine(&self) -> &Arc<dyn EngineHandle> {
        &self.shared.engine
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.is_alive()
    }

    /// Feed the effective `is_active` input
    ///
    /// While an interruption window is open the new value is only recorded;
    /// it is applied by the restore when the window ends.
    pub fn set_active(&self, active: bool) {
        self.shared.set_active(active);
    }

    /// User tap: pause a playing cell or resume a manually paused one
    ///
    /// Returns the new playing intent, or `None` when the tap was ignored
    /// (inactive, interrupted, failed, or unmounted cell).
    pub fn toggle_playback(&self) -> Option<bool> {
        self.shared.toggle_playback()
    }

    /// External preemption started (e.g. the share sheet opened)
    pub fn begin_interruption(&self) {
        self.shared.begin_interruption();
    }

    /// External preemption ended; intent is restored after the settle delay
    pub fn end_interruption(&self) {
        let Some(generation) = self.shared.close_interruption() else {
            return;
        };
        let task = reconcile::spawn_settle_task(
            &self.shared.runtime,
            Arc::downgrade(&self.shared),
            generation,
            self.shared.config.interruption_settle(),
        );
        if let Some(mut inner) = self.shared.lock_live() {
            if let Some(previous) = inner.settle_task.replace(task) {
                previous.abort();
            }
        }
    }

    /// Run one reconciliation pass now
    pub fn reconcile(&self) {
        self.shared.reconcile();
    }

    /// Apply one engine event now
    pub fn handle_engine_event(&self, event: &EngineEvent) {
        self.shared.handle_engine_event(event);
        self.shared.reconcile();
    }

    /// Stop the reconcile task and release the engine handle
    ///
    /// Idempotent. After this returns no tick, event or settle timer of
    /// this cell touches the handle again.
    pub fn unmount(&mut self) {
        if !self.shared.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        // Taking the lock waits out any pass already in flight
        let mut inner = self.shared.lock();
        if let Some(task) = inner.settle_task.take() {
            task.abort();
        }
        self.shared.engine.pause();
        self.shared.engine.release();
        debug!("Unmounted cell for item {}", self.shared.item.id);
    }

    pub fn state(&self) -> CellState {
        self.shared.lock().state
    }

    pub fn desired_playing(&self) -> bool {
        self.shared.lock().desired_playing
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().is_active
    }

    /// Current progress ratio in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.shared.lock().progress.ratio_at(Instant::now())
    }

    /// Effective muted flag as last applied to the handle
    pub fn muted(&self) -> bool {
        *self.shared.muted_tx.borrow()
    }

    pub fn is_buffering(&self) -> bool {
        self.shared.lock().buffering
    }

    pub fn has_failed(&self) -> bool {
        self.shared.lock().failed
    }

    pub fn is_interrupted(&self) -> bool {
        self.shared.lock().interruption.is_active()
    }

    /// Observe the progress ratio (published on meaningful change only)
    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.shared.progress_tx.subscribe()
    }

    /// Observe the effective muted flag
    pub fn subscribe_muted(&self) -> watch::Receiver<bool> {
        self.shared.muted_tx.subscribe()
    }

    pub fn snapshot(&self, index: Option<usize>) -> CellSnapshot {
        let inner = self.shared.lock();
        CellSnapshot {
            item_id: self.shared.item.id,
            index,
            state: inner.state,
            is_active: inner.is_active,
            desired_playing: inner.desired_playing,
            engine_playing: self.shared.engine.is_playing(),
            muted: *self.shared.muted_tx.borrow(),
            buffering: inner.buffering,
            failed: inner.failed,
            progress: inner.progress.ratio_at(Instant::now()),
        }
    }
}

impl Drop for PlaybackCell {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl CellShared {
    fn lock(&self) -> MutexGuard<'_, CellInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock only if the cell is still mounted
    fn lock_live(&self) -> Option<MutexGuard<'_, CellInner>> {
        let inner = self.lock();
        if self.is_alive() {
            Some(inner)
        } else {
            trace!("{}", Error::StaleHandle(self.item.id));
            None
        }
    }

    pub(super) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(super) fn item_id(&self) -> Uuid {
        self.item.id
    }

    pub(super) fn reconcile_interval(&self) -> Duration {
        self.config.reconcile_interval()
    }

    fn set_active(&self, active: bool) {
        let Some(mut inner) = self.lock_live() else {
            return;
        };
        if inner.is_active == active {
            return;
        }
        inner.is_active = active;

        if inner.interruption.is_active() {
            debug!(
                "Item {} activity -> {} deferred until interruption ends",
                self.item.id, active
            );
            return;
        }
        if active {
            self.activate(&mut inner);
        } else {
            self.deactivate(&mut inner);
        }
    }

    fn toggle_playback(&self) -> Option<bool> {
        let mut inner = self.lock_live()?;
        if inner.interruption.is_active() {
            debug!("Ignoring tap on item {} while interrupted", self.item.id);
            return None;
        }

        let state = inner.state;
        let playing = match state {
            CellState::ActivePlaying if inner.ended => {
                // Tap on a finished video replays it
                self.start_playback(&mut inner);
                true
            }
            CellState::ActivePlaying | CellState::ActivatingBuffering => {
                inner.desired_playing = false;
                self.engine.pause();
                inner.progress.pause(Instant::now());
                self.set_buffering(&mut inner, false);
                self.transition(&mut inner, CellState::ManuallyPaused);
                false
            }
            CellState::ManuallyPaused if inner.is_active && !inner.failed => {
                self.start_playback(&mut inner);
                true
            }
            _ => {
                debug!("Ignoring tap on item {} in state {}", self.item.id, state);
                return None;
            }
        };

        info!(
            "Item {} {} by tap",
            self.item.id,
            if playing { "resumed" } else { "paused" }
        );
        self.bus.emit_lossy(FeedEvent::PlaybackToggled {
            item_id: self.item.id,
            playing,
            timestamp: chrono::Utc::now(),
        });
        self.publish_progress(&inner);
        Some(playing)
    }

    fn begin_interruption(&self) {
        let Some(mut inner) = self.lock_live() else {
            return;
        };
        let intent = CapturedIntent {
            was_playing: inner.desired_playing,
            was_active: inner.is_active,
        };
        if !inner.interruption.open(intent) {
            return;
        }
        if let Some(task) = inner.settle_task.take() {
            // Re-opened during the settle delay
            task.abort();
        }
        debug!(
            "Interruption opened for item {} (was_playing={})",
            self.item.id, intent.was_playing
        );
        self.transition(&mut inner, CellState::Interrupted);
    }

    /// Returns the generation the settle timer must present
    fn close_interruption(&self) -> Option<u64> {
        let mut inner = self.lock_live()?;
        match inner.interruption.close() {
            Some(generation) => {
                debug!(
                    "Interruption closing for item {}, restoring in {}ms",
                    self.item.id, self.config.interruption_settle_ms
                );
                Some(generation)
            }
            None => {
                if !inner.interruption.is_closing() {
                    warn!("{} (ignored)", Error::InterruptionRace(self.item.id));
                }
                None
            }
        }
    }

    /// Settle delay elapsed: re-apply captured intent against current activity
    pub(super) fn finish_interruption(&self, generation: u64) {
        {
            let Some(mut inner) = self.lock_live() else {
                return;
            };
            let Some(intent) = inner.interruption.complete(generation) else {
                return;
            };
            inner.settle_task = None;

            if inner.failed {
                self.transition(&mut inner, CellState::Inactive);
            } else if !inner.is_active {
                self.deactivate(&mut inner);
            } else if !intent.was_active || intent.was_playing {
                // Still (or newly) the active cell with playing intent
                self.start_playback(&mut inner);
            } else {
                inner.desired_playing = false;
                self.engine.pause();
                self.transition(&mut inner, CellState::ManuallyPaused);
            }
            debug!(
                "Interruption restored for item {} -> {}",
                self.item.id, inner.state
            );
        }
        self.reconcile();
    }

    pub(super) fn handle_engine_event(&self, event: &EngineEvent) {
        let Some(mut inner) = self.lock_live() else {
            return;
        };
        let now = Instant::now();
        trace!("Item {} engine event {:?}", self.item.id, event);

        match event {
            EngineEvent::StatusChange(EngineStatus::Loading) => {
                let show = inner.desired_playing;
                self.set_buffering(&mut inner, show);
            }
            EngineEvent::StatusChange(EngineStatus::ReadyToPlay) => {
                self.set_buffering(&mut inner, false);
                if inner.state == CellState::ActivatingBuffering && inner.desired_playing {
                    self.transition(&mut inner, CellState::ActivePlaying);
                }
                if inner.state.is_active_playback()
                    && inner.desired_playing
                    && self.engine.is_playing()
                {
                    inner
                        .progress
                        .start(self.engine.current_time(), self.engine.duration(), now);
                }
            }
            EngineEvent::StatusChange(EngineStatus::Error(message)) => {
                self.fail(&mut inner, message, now);
            }
            EngineEvent::StatusChange(EngineStatus::Idle) => {}
            EngineEvent::PlayingChange(true) => {
                if inner.state == CellState::ActivatingBuffering && inner.desired_playing {
                    self.transition(&mut inner, CellState::ActivePlaying);
                }
                self.set_buffering(&mut inner, false);
                if inner.state.is_active_playback() {
                    inner
                        .progress
                        .start(self.engine.current_time(), self.engine.duration(), now);
                }
            }
            EngineEvent::PlayingChange(false) => {
                inner.progress.pause(now);
            }
            EngineEvent::PlayedToEnd => {
                inner.ended = true;
                inner.progress.pause(now);
                info!("Item {} played to end", self.item.id);
                self.bus.emit_lossy(FeedEvent::VideoEnded {
                    item_id: self.item.id,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
        self.publish_progress(&inner);
    }

    /// One reconciliation pass
    ///
    /// (a) sync mute, (b) self-heal playback unless interrupted,
    /// (c) sample progress while playing.
    pub(super) fn reconcile(&self) {
        let Some(mut inner) = self.lock_live() else {
            return;
        };
        let now = Instant::now();

        let muted = self.mute.get();
        if self.engine.is_muted() != muted {
            debug!("Syncing item {} muted={}", self.item.id, muted);
            self.engine.set_muted(muted);
        }
        self.muted_tx.send_if_modified(|current| {
            if *current != muted {
                *current = muted;
                true
            } else {
                false
            }
        });

        if !inner.interruption.is_active() {
            let playing = self.engine.is_playing();
            let duration = self.engine.duration();
            if !playing && duration > 0.0 && self.engine.current_time() >= duration {
                // Parked at the end; the ended event may still be in flight
                inner.ended = true;
            }
            if inner.desired_playing
                && !playing
                && !inner.failed
                && !inner.ended
                && duration > 0.0
            {
                warn!("Item {} stalled while desired playing, re-issuing play()", self.item.id);
                self.engine.play();
            } else if !inner.desired_playing && playing {
                debug!("Item {} playing without intent, pausing", self.item.id);
                self.engine.pause();
            }
        }

        if self.engine.is_playing() {
            // Catch up on dropped ready/playing events
            if inner.state == CellState::ActivatingBuffering && inner.desired_playing {
                self.transition(&mut inner, CellState::ActivePlaying);
            }
            if inner.buffering && self.engine.status().is_ready() {
                self.set_buffering(&mut inner, false);
            }
            if inner.desired_playing {
                match inner.progress.sample(
                    self.engine.current_time(),
                    self.engine.duration(),
                    now,
                ) {
                    SampleOutcome::LoopWrapped => {
                        debug!("Item {} looped, progress reset", self.item.id)
                    }
                    SampleOutcome::Seeked => trace!("Item {} position jumped back", self.item.id),
                    SampleOutcome::Advanced | SampleOutcome::Ignored => {}
                }
            }
        } else if inner.state == CellState::Inactive && !inner.interruption.is_active() {
            inner.progress.reset();
        } else {
            inner.progress.pause(now);
        }

        self.publish_progress(&inner);
    }

    fn activate(&self, inner: &mut CellInner) {
        if inner.failed {
            debug!("Item {} failed, not starting playback", self.item.id);
            return;
        }
        if inner.desired_playing || inner.state == CellState::ManuallyPaused {
            return;
        }
        self.start_playback(inner);
    }

    fn deactivate(&self, inner: &mut CellInner) {
        inner.desired_playing = false;
        if inner.state != CellState::Inactive || self.engine.is_playing() {
            self.engine.pause();
        }
        inner.progress.reset();
        self.set_buffering(inner, false);
        self.transition(inner, CellState::Inactive);
        self.publish_progress(inner);
    }

    fn start_playback(&self, inner: &mut CellInner) {
        inner.desired_playing = true;
        inner.ended = false;
        self.engine.play();

        let status = self.engine.status();
        if status.is_ready() {
            self.set_buffering(inner, false);
            self.transition(inner, CellState::ActivePlaying);
            if self.engine.is_playing() {
                inner.progress.start(
                    self.engine.current_time(),
                    self.engine.duration(),
                    Instant::now(),
                );
            }
        } else {
            let loading = !matches!(status, EngineStatus::Error(_));
            self.set_buffering(inner, loading);
            self.transition(inner, CellState::ActivatingBuffering);
        }
    }

    fn fail(&self, inner: &mut CellInner, message: &str, now: Instant) {
        let err = Error::Engine {
            item_id: self.item.id,
            message: message.to_string(),
        };
        error!("{}", err);

        inner.failed = true;
        inner.progress.pause(now);
        self.set_buffering(inner, false);
        self.bus.emit_lossy(FeedEvent::PlaybackError {
            item_id: self.item.id,
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        });
        if !inner.interruption.is_active() {
            self.transition(inner, CellState::Inactive);
        }
    }

    fn transition(&self, inner: &mut CellInner, new_state: CellState) {
        let old_state = inner.state;
        if old_state == new_state {
            return;
        }
        inner.state = new_state;
        debug!("Item {} {} -> {}", self.item.id, old_state, new_state);
        self.bus.emit_lossy(FeedEvent::CellStateChanged {
            item_id: self.item.id,
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    fn set_buffering(&self, inner: &mut CellInner, buffering: bool) {
        if inner.buffering == buffering {
            return;
        }
        inner.buffering = buffering;
        self.bus.emit_lossy(FeedEvent::BufferingChanged {
            item_id: self.item.id,
            buffering,
            timestamp: chrono::Utc::now(),
        });
    }

    fn publish_progress(&self, inner: &CellInner) {
        let ratio = inner.progress.ratio_at(Instant::now());
        let min_delta = self.config.progress_min_delta;
        self.progress_tx.send_if_modified(|current| {
            let changed = (ratio == 0.0 && *current != 0.0)
                || (ratio >= 1.0 && *current < 1.0)
                || (ratio - *current).abs() >= min_delta;
            if changed {
                *current = ratio;
            }
            changed
        });
    }
}
