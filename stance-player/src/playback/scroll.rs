//! Feed scroll controller
//!
//! Maps scroll-offset samples of the paged list to the single active index.
//! Every sample is evaluated immediately (no debounce, no settle wait) so
//! the dominant on-screen page becomes active on the same frame.

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Active index transition produced by a scroll sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveIndexChange {
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
}

/// Scroll offset → active index
pub struct FeedScrollController {
    page_height: f64,
    item_count: usize,
    last_offset: f64,
    active: Option<usize>,
    tx: watch::Sender<Option<usize>>,
}

impl FeedScrollController {
    /// Create a controller positioned at offset 0
    pub fn new(page_height: f64, item_count: usize) -> Result<Self> {
        validate_page_height(page_height)?;
        let active = index_for(0.0, page_height, item_count);
        let (tx, _) = watch::channel(active);
        Ok(Self {
            page_height,
            item_count,
            last_offset: 0.0,
            active,
            tx,
        })
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn page_height(&self) -> f64 {
        self.page_height
    }

    /// Observe active index publications
    pub fn subscribe(&self) -> watch::Receiver<Option<usize>> {
        self.tx.subscribe()
    }

    /// Feed one scroll sample
    ///
    /// Returns the transition when the active index changed.
    pub fn on_scroll(&mut self, offset: f64) -> Option<ActiveIndexChange> {
        if !offset.is_finite() {
            warn!("Ignoring non-finite scroll offset {}", offset);
            return None;
        }
        self.last_offset = offset;
        self.publish(index_for(offset, self.page_height, self.item_count))
    }

    /// Update the list length, re-clamping the active index
    pub fn set_item_count(&mut self, item_count: usize) -> Option<ActiveIndexChange> {
        self.item_count = item_count;
        self.publish(index_for(self.last_offset, self.page_height, item_count))
    }

    /// Update the page height (e.g. after rotation) and re-evaluate
    pub fn set_page_height(&mut self, page_height: f64) -> Result<Option<ActiveIndexChange>> {
        validate_page_height(page_height)?;
        self.page_height = page_height;
        Ok(self.publish(index_for(self.last_offset, page_height, self.item_count)))
    }

    fn publish(&mut self, new_index: Option<usize>) -> Option<ActiveIndexChange> {
        if new_index == self.active {
            return None;
        }
        let change = ActiveIndexChange {
            old_index: self.active,
            new_index,
        };
        debug!("Active index {:?} -> {:?}", change.old_index, change.new_index);
        self.active = new_index;
        self.tx.send_replace(new_index);
        Some(change)
    }
}

fn validate_page_height(page_height: f64) -> Result<()> {
    if page_height.is_finite() && page_height > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "page height must be positive, got {}",
            page_height
        )))
    }
}

/// `round(offset / page_height)` clamped to the valid item range
fn index_for(offset: f64, page_height: f64, item_count: usize) -> Option<usize> {
    if item_count == 0 {
        return None;
    }
    let raw = (offset / page_height).round();
    let max = (item_count - 1) as f64;
    Some(raw.clamp(0.0, max) as usize)
}
