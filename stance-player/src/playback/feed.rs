//! Feed coordinator
//!
//! Owns the scroll controller, the cells mounted in the render window, the
//! focus and interruption inputs, and fans their combined effect out to
//! cells. Activity changes always deactivate the previous cell before the
//! next one is activated, so two handles never play at once.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};
use uuid::Uuid;

use stance_common::events::{EventBus, FeedEvent};

use super::cell::PlaybackCell;
use super::engine::EngineFactory;
use super::mute::MuteState;
use super::scroll::{ActiveIndexChange, FeedScrollController};
use super::types::{CellSnapshot, FeedItem};
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};

/// Active-cell scheduler for one vertical feed
pub struct Feed {
    config: SchedulerConfig,
    factory: Arc<dyn EngineFactory>,
    mute: MuteState,
    bus: EventBus,
    runtime: Handle,
    items: Vec<FeedItem>,
    scroll: FeedScrollController,
    cells: HashMap<Uuid, PlaybackCell>,
    focused: bool,
    interrupted: bool,
    /// Last published effective active index
    published: Option<usize>,
}

impl Feed {
    /// Create an empty, focused feed
    ///
    /// Must be called from within a tokio runtime; cells spawn their
    /// reconcile tasks on it.
    pub fn new(
        config: SchedulerConfig,
        factory: Arc<dyn EngineFactory>,
        mute: MuteState,
        bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::Internal(format!("Feed requires a tokio runtime: {}", e)))?;
        let scroll = FeedScrollController::new(config.page_height, 0)?;

        info!(
            "Feed scheduler ready (reconcile {}ms, settle {}ms, window ±{})",
            config.reconcile_interval_ms, config.interruption_settle_ms, config.render_window
        );

        Ok(Self {
            config,
            factory,
            mute,
            bus,
            runtime,
            items: Vec::new(),
            scroll,
            cells: HashMap::new(),
            focused: true,
            interrupted: false,
            published: None,
        })
    }

    /// Replace the ordered item list
    ///
    /// Cells for items that stay inside the render window survive; the
    /// active index is re-clamped to the new length.
    pub fn set_items(&mut self, items: Vec<FeedItem>) {
        let mut seen = HashSet::new();
        let items: Vec<FeedItem> = items
            .into_iter()
            .filter(|item| {
                let fresh = seen.insert(item.id);
                if !fresh {
                    debug!("Dropping duplicate feed item {}", item.id);
                }
                fresh
            })
            .collect();

        info!("Feed items updated: {} items", items.len());
        self.items = items;
        self.scroll.set_item_count(self.items.len());
        self.refresh();
    }

    /// Feed one scroll-offset sample
    ///
    /// Returns the change of the effective active index, if any.
    pub fn on_scroll(&mut self, offset: f64) -> Option<ActiveIndexChange> {
        self.scroll.on_scroll(offset)?;
        self.refresh()
    }

    /// Page height changed (rotation, resize)
    pub fn set_page_height(&mut self, page_height: f64) -> Result<()> {
        if self.scroll.set_page_height(page_height)?.is_some() {
            self.refresh();
        }
        Ok(())
    }

    /// App/tab focus; losing focus deactivates every cell
    pub fn set_focused(&mut self, focused: bool) {
        if self.focused == focused {
            return;
        }
        info!("Feed focus: {}", focused);
        self.focused = focused;
        self.refresh();
    }

    /// External interruption window (e.g. share sheet) opened or closed
    pub fn set_interruption(&mut self, open: bool) {
        if self.interrupted == open {
            return;
        }
        info!("External interruption {}", if open { "opened" } else { "closed" });
        self.interrupted = open;
        for cell in self.cells.values() {
            if open {
                cell.begin_interruption();
            } else {
                cell.end_interruption();
            }
        }
    }

    /// Flip the shared mute preference; cells converge on their next tick
    pub fn toggle_mute(&self) -> bool {
        let muted = self.mute.toggle();
        self.bus.emit_lossy(FeedEvent::MuteChanged {
            muted,
            timestamp: chrono::Utc::now(),
        });
        muted
    }

    /// User tap on the cell at `index`
    pub fn toggle_playback(&self, index: usize) -> Option<bool> {
        self.cell(index)?.toggle_playback()
    }

    /// Index allowed to play right now (`None` when unfocused or empty)
    pub fn active_index(&self) -> Option<usize> {
        if self.focused {
            self.scroll.active_index()
        } else {
            None
        }
    }

    /// Index derived from the scroll position alone
    pub fn scroll_index(&self) -> Option<usize> {
        self.scroll.active_index()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn mute(&self) -> &MuteState {
        &self.mute
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Mounted cell at `index`, if inside the render window
    pub fn cell(&self, index: usize) -> Option<&PlaybackCell> {
        let item = self.items.get(index)?;
        self.cells.get(&item.id)
    }

    pub fn mounted_count(&self) -> usize {
        self.cells.len()
    }

    /// Indices with a mounted cell, ascending
    pub fn mounted_indices(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| self.cells.contains_key(&item.id))
            .map(|(index, _)| index)
            .collect()
    }

    /// Read-out of every mounted cell in feed order
    pub fn snapshots(&self) -> Vec<CellSnapshot> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                self.cells
                    .get(&item.id)
                    .map(|cell| cell.snapshot(Some(index)))
            })
            .collect()
    }

    /// Unmount every cell
    pub fn shutdown(&mut self) {
        let count = self.cells.len();
        for (_, mut cell) in self.cells.drain() {
            cell.unmount();
        }
        info!("Feed shut down ({} cells unmounted)", count);
    }

    /// Re-apply activity and the render window, publishing index changes
    fn refresh(&mut self) -> Option<ActiveIndexChange> {
        self.apply_activity();
        self.sync_window();

        let effective = self.active_index();
        if effective == self.published {
            return None;
        }
        let old_index = std::mem::replace(&mut self.published, effective);
        info!("Active index {:?} -> {:?}", old_index, effective);
        self.bus.emit_lossy(FeedEvent::ActiveIndexChanged {
            old_index,
            new_index: effective,
            timestamp: chrono::Utc::now(),
        });
        Some(ActiveIndexChange {
            old_index,
            new_index: effective,
        })
    }

    /// Deactivate every mounted cell except the active one, then activate it
    fn apply_activity(&self) {
        let active_id = self
            .active_index()
            .and_then(|index| self.items.get(index))
            .map(|item| item.id);

        for (id, cell) in &self.cells {
            if Some(*id) != active_id {
                cell.set_active(false);
            }
        }
        if let Some(cell) = active_id.and_then(|id| self.cells.get(&id)) {
            cell.set_active(true);
        }
    }

    /// Mount cells entering the render window, unmount those leaving it
    fn sync_window(&mut self) {
        let window = self.render_window();
        let wanted: HashSet<Uuid> = window
            .clone()
            .filter_map(|index| self.items.get(index).map(|item| item.id))
            .collect();

        let leaving: Vec<Uuid> = self
            .cells
            .keys()
            .filter(|id| !wanted.contains(id))
            .copied()
            .collect();
        for id in leaving {
            if let Some(mut cell) = self.cells.remove(&id) {
                cell.unmount();
            }
        }

        let active = self.active_index();
        for index in window {
            let Some(item) = self.items.get(index) else {
                continue;
            };
            if self.cells.contains_key(&item.id) {
                continue;
            }
            let engine = self.factory.create(item);
            let cell = PlaybackCell::mount(
                item.clone(),
                engine,
                self.mute.clone(),
                self.bus.clone(),
                self.config.clone(),
                active == Some(index),
                self.interrupted,
                &self.runtime,
            );
            self.cells.insert(item.id, cell);
        }
    }

    /// Indices to keep mounted around the scroll position
    fn render_window(&self) -> RangeInclusive<usize> {
        let count = self.items.len();
        if count == 0 {
            // Empty range
            return 1..=0;
        }
        let center = self.scroll.active_index().unwrap_or(0);
        let start = center.saturating_sub(self.config.render_window);
        let end = center
            .saturating_add(self.config.render_window)
            .min(count - 1);
        start..=end
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        if !self.cells.is_empty() {
            self.shutdown();
        }
    }
}
