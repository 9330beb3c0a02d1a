//! Event types for the Stance event system
//!
//! Provides shared event definitions and EventBus for the feed scheduler
//! and its observers (presentation layer, analytics, autoplay).

mod playback_types;

pub use playback_types::CellState;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Feed scheduler event types
///
/// Events are broadcast via EventBus and can be serialized for logging or
/// forwarding to a presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    /// The feed's active index changed
    ///
    /// Emitted synchronously with the scroll sample (or focus change) that
    /// caused it. `None` means no cell may play.
    ActiveIndexChanged {
        /// Previously active index
        old_index: Option<usize>,
        /// Newly active index
        new_index: Option<usize>,
        /// When the index changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A cell moved between scheduler states
    CellStateChanged {
        /// Feed item owning the cell
        item_id: Uuid,
        /// State before the transition
        old_state: CellState,
        /// State after the transition
        new_state: CellState,
        /// When the transition happened
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Buffering indicator shown or cleared for a cell
    BufferingChanged {
        /// Feed item owning the cell
        item_id: Uuid,
        /// Whether the spinner should be visible
        buffering: bool,
        /// When the indicator changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Video reached its end without looping
    ///
    /// Triggers:
    /// - Analytics: record completed view
    /// - Autoplay: advance to the next item
    VideoEnded {
        /// Feed item that ended
        item_id: Uuid,
        /// When playback ended
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Engine reported a decode or network error
    ///
    /// Non-fatal to the scheduler. The cell stops trying to play until the
    /// caller remounts it with a fresh handle.
    PlaybackError {
        /// Feed item whose engine failed
        item_id: Uuid,
        /// Engine-provided description
        message: String,
        /// When the error was reported
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Shared mute preference toggled
    MuteChanged {
        /// New muted value
        muted: bool,
        /// When the preference changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// User tapped a cell to play or pause it
    ///
    /// Drives the brief play/pause icon flash.
    PlaybackToggled {
        /// Feed item that was tapped
        item_id: Uuid,
        /// Whether the tap resumed (true) or paused (false) playback
        playing: bool,
        /// When the tap was applied
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl FeedEvent {
    /// Event type name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::ActiveIndexChanged { .. } => "ActiveIndexChanged",
            FeedEvent::CellStateChanged { .. } => "CellStateChanged",
            FeedEvent::BufferingChanged { .. } => "BufferingChanged",
            FeedEvent::VideoEnded { .. } => "VideoEnded",
            FeedEvent::PlaybackError { .. } => "PlaybackError",
            FeedEvent::MuteChanged { .. } => "MuteChanged",
            FeedEvent::PlaybackToggled { .. } => "PlaybackToggled",
        }
    }
}

/// Central event distribution bus
///
/// One-to-many broadcast of FeedEvents. Slow subscribers lose the oldest
/// events rather than blocking emitters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use stance_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity: capacity.max(1) }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FeedEvent,
    ) -> Result<usize, broadcast::error::SendError<FeedEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// # Examples
    ///
    /// ```
    /// use stance_common::events::{EventBus, FeedEvent};
    ///
    /// let event_bus = EventBus::new(16);
    /// event_bus.emit_lossy(FeedEvent::MuteChanged {
    ///     muted: true,
    ///     timestamp: chrono::Utc::now(),
    /// });
    /// ```
    pub fn emit_lossy(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
