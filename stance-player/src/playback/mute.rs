//! Shared mute preference
//!
//! One value per app session, injected into every cell. Toggling never
//! touches an engine handle directly: each cell converges on its next
//! reconciliation tick, and newly mounted cells read it at creation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Process-wide mute preference (cheap to clone, all clones share the value)
#[derive(Debug, Clone)]
pub struct MuteState {
    inner: Arc<MuteInner>,
}

#[derive(Debug)]
struct MuteInner {
    /// Lock-free read path for reconciliation ticks
    muted: AtomicBool,
    /// Observer channel for the mute icon
    tx: watch::Sender<bool>,
}

impl MuteState {
    pub fn new(initial_muted: bool) -> Self {
        let (tx, _) = watch::channel(initial_muted);
        Self {
            inner: Arc::new(MuteInner {
                muted: AtomicBool::new(initial_muted),
                tx,
            }),
        }
    }

    pub fn get(&self) -> bool {
        self.inner.muted.load(Ordering::Acquire)
    }

    /// Flip the preference and return the new value
    pub fn toggle(&self) -> bool {
        let mut new_value = false;
        self.inner.tx.send_modify(|muted| {
            *muted = !*muted;
            new_value = *muted;
            self.inner.muted.store(new_value, Ordering::Release);
        });
        info!("Mute toggled: muted={}", new_value);
        new_value
    }

    /// Observe preference changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }
}

impl Default for MuteState {
    fn default() -> Self {
        Self::new(false)
    }
}
