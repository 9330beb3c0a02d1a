//! Test helpers for stance-player integration tests
//!
//! Provides a feed wired to simulated engines plus a stepping clock that
//! advances engine time and tokio's paused clock together, so reconcile
//! ticks and engine progress stay in lockstep.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use stance_common::events::{CellState, EventBus, FeedEvent};
use stance_player::playback::{
    EngineHandle, Feed, FeedItem, MuteState, PlaybackCell, SimulatedEngine,
    SimulatedEngineFactory,
};
use stance_player::SchedulerConfig;
use tokio::sync::broadcast::{self, error::TryRecvError};
use uuid::Uuid;

/// Clock step used by [`TestFeed::run_for`]
pub const STEP: Duration = Duration::from_millis(50);

/// Page height used by every test feed
pub const PAGE: f64 = 100.0;

/// Default scheduler config with a small page height
pub fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        page_height: PAGE,
        ..Default::default()
    }
}

pub fn make_items(count: usize) -> Vec<FeedItem> {
    (0..count)
        .map(|i| FeedItem::new(Uuid::new_v4(), format!("sim://take/{}", i)))
        .collect()
}

/// Fresh feed whose first cell has finished loading and is playing
pub async fn playing_feed(count: usize) -> TestFeed {
    let feed = TestFeed::new(count);
    feed.run_for(Duration::from_millis(200)).await;
    feed
}

/// Feed + simulated engines + event capture
pub struct TestFeed {
    pub feed: Feed,
    pub factory: Arc<SimulatedEngineFactory>,
    pub bus: EventBus,
    pub events: broadcast::Receiver<FeedEvent>,
    pub items: Vec<FeedItem>,
}

impl TestFeed {
    /// `count` items, default config, 10 s looping videos, 100 ms load latency
    pub fn new(count: usize) -> Self {
        Self::build(
            count,
            test_config(),
            SimulatedEngineFactory::new(10.0, Duration::from_millis(100)),
        )
    }

    pub fn with_config(count: usize, config: SchedulerConfig) -> Self {
        Self::build(
            count,
            config,
            SimulatedEngineFactory::new(10.0, Duration::from_millis(100)),
        )
    }

    pub fn build(count: usize, config: SchedulerConfig, factory: SimulatedEngineFactory) -> Self {
        let factory = Arc::new(factory);
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let mut feed = Feed::new(config, factory.clone(), MuteState::default(), bus.clone())
            .expect("feed should build");
        let items = make_items(count);
        feed.set_items(items.clone());
        Self {
            feed,
            factory,
            bus,
            events,
            items,
        }
    }

    /// Most recent engine created for the item at `index`
    pub fn engine(&self, index: usize) -> Arc<SimulatedEngine> {
        self.factory
            .engine_for(self.items[index].id)
            .unwrap_or_else(|| panic!("no engine created for index {}", index))
    }

    /// Mounted cell at `index`
    pub fn cell(&self, index: usize) -> &PlaybackCell {
        self.feed
            .cell(index)
            .unwrap_or_else(|| panic!("no mounted cell at index {}", index))
    }

    pub fn state(&self, index: usize) -> CellState {
        self.cell(index).state()
    }

    /// Advance engine time and the tokio clock together
    pub async fn run_for(&self, duration: Duration) {
        let steps = (duration.as_millis() / STEP.as_millis()).max(1);
        for _ in 0..steps {
            self.factory.advance_all(STEP);
            tokio::time::sleep(STEP).await;
        }
    }

    /// Let pending tasks run without moving engine time
    pub async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Scroll so that `index` is the dominant page
    pub fn scroll_to(&mut self, index: usize) {
        self.feed.on_scroll(index as f64 * PAGE);
    }

    /// Every event captured since the last drain
    pub fn drain_events(&mut self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    /// Number of simulated engines currently producing frames
    pub fn playing_engines(&self) -> usize {
        self.factory
            .engines()
            .iter()
            .filter(|engine| !engine.is_released() && engine.is_playing())
            .count()
    }
}
