//! Interruption window bookkeeping
//!
//! While an external agent (the OS share sheet) owns the handle, the cell
//! must not enforce its intent. The guard records what the cell wanted
//! when the window opened and hands it back once the window closes and the
//! settle delay has elapsed. A generation counter lets a re-open during the
//! settle delay invalidate the pending restore.

use tracing::debug;

/// Intent captured when the window opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedIntent {
    /// `desired_playing` at open
    pub was_playing: bool,
    /// Whether the cell was the active one at open
    pub was_active: bool,
}

/// Per-cell interruption window
#[derive(Debug, Default)]
pub struct InterruptionGuard {
    active: bool,
    closing: bool,
    intent: Option<CapturedIntent>,
    generation: u64,
}

impl InterruptionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window open (including the settle delay after close)
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Close received, restore pending
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Open the window, capturing the current intent
    ///
    /// Returns false for a duplicate open. A re-open during the settle
    /// delay keeps the originally captured intent and cancels the pending
    /// restore.
    pub fn open(&mut self, intent: CapturedIntent) -> bool {
        if self.active && !self.closing {
            debug!("Interruption already open (generation {})", self.generation);
            return false;
        }
        if !self.active {
            self.intent = Some(intent);
        }
        self.active = true;
        self.closing = false;
        self.generation += 1;
        true
    }

    /// Mark the window as closing
    ///
    /// Returns the generation the settle timer must present to
    /// [`complete`](Self::complete), or `None` when there is nothing to
    /// close (close without open, or a duplicate close).
    pub fn close(&mut self) -> Option<u64> {
        if !self.active || self.closing {
            return None;
        }
        self.closing = true;
        Some(self.generation)
    }

    /// Consume the window after the settle delay
    ///
    /// Returns the captured intent only if no newer open happened since the
    /// matching close.
    pub fn complete(&mut self, generation: u64) -> Option<CapturedIntent> {
        if !(self.active && self.closing && self.generation == generation) {
            debug!(
                "Stale interruption restore (generation {} vs {})",
                generation, self.generation
            );
            return None;
        }
        self.active = false;
        self.closing = false;
        self.intent.take()
    }
}
