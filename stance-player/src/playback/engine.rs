//! Playback engine handle abstraction
//!
//! The platform media subsystem is an external collaborator. The scheduler
//! only sees it through [`EngineHandle`]: fire-and-forget commands, cheap
//! synchronous readouts, and an asynchronous event stream. Implementations
//! must make `play()` on a playing handle and `pause()` on a paused handle
//! no-ops from the event stream's point of view.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::types::FeedItem;

/// Engine load status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// Created, nothing requested yet
    Idle,
    /// Fetching/decoding the first frames
    Loading,
    /// Can start playing without stalling
    ReadyToPlay,
    /// Decode or network failure
    Error(String),
}

impl EngineStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineStatus::ReadyToPlay)
    }
}

/// Events delivered asynchronously by an engine handle
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Load status changed
    StatusChange(EngineStatus),
    /// Engine started or stopped producing frames
    PlayingChange(bool),
    /// A non-looping playthrough reached the end
    PlayedToEnd,
}

/// Per-item playback engine handle
pub trait EngineHandle: Send + Sync {
    /// Start or resume playback (idempotent)
    fn play(&self);

    /// Pause playback (idempotent)
    fn pause(&self);

    /// Engine truth: currently producing frames
    fn is_playing(&self) -> bool;

    fn is_muted(&self) -> bool;

    fn set_muted(&self, muted: bool);

    /// Position in seconds
    fn current_time(&self) -> f64;

    /// Length in seconds (0 until known)
    fn duration(&self) -> f64;

    fn status(&self) -> EngineStatus;

    /// Subscribe to status/playing events
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;

    /// Begin buffering without playing
    fn preload(&self) {}

    /// Dispose of the handle; called once when its cell unmounts
    fn release(&self) {}
}

/// Creates one engine handle per mounted feed item
pub trait EngineFactory: Send + Sync {
    fn create(&self, item: &FeedItem) -> Arc<dyn EngineHandle>;
}
