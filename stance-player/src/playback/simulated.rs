//! Deterministic in-process engine
//!
//! Stands in for the platform media engine in the driver binary and in
//! tests. Time only moves when [`SimulatedEngine::advance`] is called, so
//! tests control load latency, playback position, loop-wraps and
//! end-of-video precisely. Every command is counted so tests can assert
//! which calls the scheduler made.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use super::engine::{EngineEvent, EngineFactory, EngineHandle, EngineStatus};
use super::types::FeedItem;

/// Command and event counters for one simulated engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub play_calls: u64,
    pub pause_calls: u64,
    pub mute_writes: u64,
    pub preload_calls: u64,
    pub events_emitted: u64,
    /// Commands received after `release()`; always a scheduler bug
    pub calls_after_release: u64,
}

#[derive(Debug)]
struct SimState {
    status: EngineStatus,
    playing: bool,
    play_requested: bool,
    muted: bool,
    position: f64,
    duration: f64,
    looping: bool,
    load_latency: Duration,
    load_elapsed: Duration,
    released: bool,
    stats: EngineStats,
}

/// Simulated playback engine handle
pub struct SimulatedEngine {
    item_id: Uuid,
    state: Mutex<SimState>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl SimulatedEngine {
    /// Create an idle engine for a video of `duration_secs`
    ///
    /// The engine reports `Loading` on the first `play()`/`preload()` and
    /// becomes ready after `load_latency` of simulated time.
    pub fn new(item_id: Uuid, duration_secs: f64, load_latency: Duration) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            item_id,
            state: Mutex::new(SimState {
                status: EngineStatus::Idle,
                playing: false,
                play_requested: false,
                muted: false,
                position: 0.0,
                duration: duration_secs.max(0.0),
                looping: true,
                load_latency,
                load_elapsed: Duration::ZERO,
                released: false,
                stats: EngineStats::default(),
            }),
            events_tx,
        }
    }

    /// Create an engine that is already buffered
    pub fn ready(item_id: Uuid, duration_secs: f64) -> Self {
        let engine = Self::new(item_id, duration_secs, Duration::ZERO);
        engine.lock().status = EngineStatus::ReadyToPlay;
        engine
    }

    /// Loop back to 0 at the end (default) or stop and report `PlayedToEnd`
    pub fn with_looping(self, looping: bool) -> Self {
        self.lock().looping = looping;
        self
    }

    pub fn item_id(&self) -> Uuid {
        self.item_id
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, st: &mut SimState, event: EngineEvent) {
        st.stats.events_emitted += 1;
        trace!("SimulatedEngine {}: {:?}", self.item_id, event);
        let _ = self.events_tx.send(event);
    }

    /// Move simulated time forward
    ///
    /// While loading, time counts toward the load latency. While playing,
    /// it advances the position, looping or ending at the duration.
    pub fn advance(&self, dt: Duration) {
        let mut guard = self.lock();
        let st = &mut *guard;
        if st.released {
            return;
        }

        let status = st.status.clone();
        match status {
            EngineStatus::Loading => {
                st.load_elapsed += dt;
                if st.load_elapsed >= st.load_latency {
                    st.status = EngineStatus::ReadyToPlay;
                    self.emit(st, EngineEvent::StatusChange(EngineStatus::ReadyToPlay));
                    if st.play_requested && !st.playing {
                        st.playing = true;
                        self.emit(st, EngineEvent::PlayingChange(true));
                    }
                }
            }
            EngineStatus::ReadyToPlay if st.playing && st.duration > 0.0 => {
                st.position += dt.as_secs_f64();
                if st.position >= st.duration {
                    if st.looping {
                        st.position %= st.duration;
                    } else {
                        st.position = st.duration;
                        st.playing = false;
                        st.play_requested = false;
                        self.emit(st, EngineEvent::PlayedToEnd);
                        self.emit(st, EngineEvent::PlayingChange(false));
                    }
                }
            }
            _ => {}
        }
    }

    /// Report a decode/network failure
    pub fn fail(&self, message: &str) {
        let mut guard = self.lock();
        let st = &mut *guard;
        let was_playing = st.playing;
        st.status = EngineStatus::Error(message.to_string());
        st.playing = false;
        st.play_requested = false;
        st.duration = 0.0;
        self.emit(st, EngineEvent::StatusChange(EngineStatus::Error(message.to_string())));
        if was_playing {
            self.emit(st, EngineEvent::PlayingChange(false));
        }
    }

    /// Stop producing frames without telling anyone (dropped event)
    pub fn stall(&self) {
        let mut guard = self.lock();
        let st = &mut *guard;
        st.playing = false;
    }

    /// Pause from outside the scheduler (e.g. the OS share sheet)
    ///
    /// Not counted in `pause_calls`.
    pub fn external_pause(&self) {
        let mut guard = self.lock();
        let st = &mut *guard;
        st.play_requested = false;
        if st.playing {
            st.playing = false;
            self.emit(st, EngineEvent::PlayingChange(false));
        }
    }

    /// Jump to `secs` without emitting events
    pub fn seek(&self, secs: f64) {
        let mut guard = self.lock();
        let st = &mut *guard;
        st.position = secs.clamp(0.0, st.duration);
    }

    pub fn stats(&self) -> EngineStats {
        self.lock().stats
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Count a command and report whether the engine is still usable
    fn command(&self, st: &mut SimState, count: impl FnOnce(&mut EngineStats)) -> bool {
        count(&mut st.stats);
        if st.released {
            st.stats.calls_after_release += 1;
            return false;
        }
        true
    }
}

impl EngineHandle for SimulatedEngine {
    fn play(&self) {
        let mut guard = self.lock();
        let st = &mut *guard;
        if !self.command(st, |s| s.play_calls += 1) {
            return;
        }

        let status = st.status.clone();
        match status {
            EngineStatus::Error(_) => {}
            EngineStatus::Idle => {
                st.play_requested = true;
                st.status = EngineStatus::Loading;
                self.emit(st, EngineEvent::StatusChange(EngineStatus::Loading));
            }
            EngineStatus::Loading => {
                st.play_requested = true;
            }
            EngineStatus::ReadyToPlay => {
                st.play_requested = true;
                if !st.playing {
                    if !st.looping && st.position >= st.duration {
                        st.position = 0.0;
                    }
                    st.playing = true;
                    self.emit(st, EngineEvent::PlayingChange(true));
                }
            }
        }
    }

    fn pause(&self) {
        let mut guard = self.lock();
        let st = &mut *guard;
        if !self.command(st, |s| s.pause_calls += 1) {
            return;
        }
        st.play_requested = false;
        if st.playing {
            st.playing = false;
            self.emit(st, EngineEvent::PlayingChange(false));
        }
    }

    fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn is_muted(&self) -> bool {
        self.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        let mut guard = self.lock();
        let st = &mut *guard;
        if !self.command(st, |s| s.mute_writes += 1) {
            return;
        }
        st.muted = muted;
    }

    fn current_time(&self) -> f64 {
        self.lock().position
    }

    fn duration(&self) -> f64 {
        let st = self.lock();
        if st.status.is_ready() {
            st.duration
        } else {
            0.0
        }
    }

    fn status(&self) -> EngineStatus {
        self.lock().status.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    fn preload(&self) {
        let mut guard = self.lock();
        let st = &mut *guard;
        if !self.command(st, |s| s.preload_calls += 1) {
            return;
        }
        if st.status == EngineStatus::Idle {
            st.status = EngineStatus::Loading;
            self.emit(st, EngineEvent::StatusChange(EngineStatus::Loading));
        }
    }

    fn release(&self) {
        let mut guard = self.lock();
        let st = &mut *guard;
        st.released = true;
        st.playing = false;
        st.play_requested = false;
    }
}

/// Factory producing simulated engines and remembering every one it made
pub struct SimulatedEngineFactory {
    duration_secs: f64,
    load_latency: Duration,
    looping: bool,
    created: Mutex<Vec<Arc<SimulatedEngine>>>,
}

impl SimulatedEngineFactory {
    pub fn new(duration_secs: f64, load_latency: Duration) -> Self {
        Self {
            duration_secs,
            load_latency,
            looping: true,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    fn created(&self) -> MutexGuard<'_, Vec<Arc<SimulatedEngine>>> {
        self.created.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Most recently created engine for an item
    pub fn engine_for(&self, item_id: Uuid) -> Option<Arc<SimulatedEngine>> {
        self.created()
            .iter()
            .rev()
            .find(|e| e.item_id() == item_id)
            .cloned()
    }

    /// Every engine created so far, in creation order
    pub fn engines(&self) -> Vec<Arc<SimulatedEngine>> {
        self.created().clone()
    }

    /// Advance every live engine
    pub fn advance_all(&self, dt: Duration) {
        for engine in self.created().iter().filter(|e| !e.is_released()) {
            engine.advance(dt);
        }
    }
}

impl EngineFactory for SimulatedEngineFactory {
    fn create(&self, item: &FeedItem) -> Arc<dyn EngineHandle> {
        let engine = Arc::new(
            SimulatedEngine::new(item.id, self.duration_secs, self.load_latency)
                .with_looping(self.looping),
        );
        self.created().push(Arc::clone(&engine));
        engine
    }
}
