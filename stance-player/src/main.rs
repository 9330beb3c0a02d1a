//! Stance feed player (stance-player) - Main entry point
//!
//! Runs a scripted feed session (scrolling, mute toggle, taps, a share-sheet
//! interruption, focus loss) against simulated playback engines and logs
//! every scheduler event. Useful for observing the scheduler without a UI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use stance_common::events::EventBus;
use stance_player::playback::{Feed, FeedItem, MuteState, SimulatedEngineFactory};
use stance_player::{Config, ConfigOverrides, ProgressStrategy};

/// Simulated engine clock resolution
const ENGINE_TICK: Duration = Duration::from_millis(50);

/// Command-line arguments for stance-player
#[derive(Parser, Debug)]
#[command(name = "stance-player")]
#[command(about = "Feed playback scheduler driven against simulated engines")]
#[command(version)]
struct Args {
    /// Path to TOML config file (otherwise STANCE_CONFIG or the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of feed items in the scripted session
    #[arg(long, default_value_t = 5)]
    items: usize,

    /// Length of every simulated video in seconds
    #[arg(long, default_value_t = 6.0)]
    video_secs: f64,

    /// Simulated load latency before an engine is ready
    #[arg(long, default_value_t = 300)]
    load_latency_ms: u64,

    /// Override the reconciliation interval
    #[arg(long, env = "STANCE_RECONCILE_INTERVAL_MS")]
    reconcile_interval_ms: Option<u64>,

    /// Override the interruption settle delay
    #[arg(long, env = "STANCE_SETTLE_MS")]
    settle_ms: Option<u64>,

    /// Override the progress strategy
    #[arg(long, value_enum)]
    progress_strategy: Option<ProgressStrategy>,

    /// Override the log level (RUST_LOG takes precedence)
    #[arg(long, env = "STANCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print every scheduler event as a JSON line on stdout
    #[arg(long)]
    json_events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        reconcile_interval_ms: args.reconcile_interval_ms,
        interruption_settle_ms: args.settle_ms,
        progress_strategy: args.progress_strategy,
        log_level: args.log_level.clone(),
    };
    let config = Config::load(args.config.as_deref(), overrides)
        .context("Failed to load configuration")?;

    init_tracing(&config.logging.level, config.logging.json);

    if !(args.video_secs.is_finite() && args.video_secs > 0.0) {
        bail!("--video-secs must be positive, got {}", args.video_secs);
    }

    info!(
        "Starting stance-player: {} items, {}s videos, {}ms load latency",
        args.items, args.video_secs, args.load_latency_ms
    );

    let factory = Arc::new(SimulatedEngineFactory::new(
        args.video_secs,
        Duration::from_millis(args.load_latency_ms),
    ));
    let bus = EventBus::new(config.scheduler.event_bus_capacity);
    let mut feed = Feed::new(
        config.scheduler.clone(),
        factory.clone(),
        MuteState::default(),
        bus.clone(),
    )
    .context("Failed to create feed scheduler")?;

    let logger = tokio::spawn(log_events(bus.clone(), args.json_events));
    let clock = {
        let factory = Arc::clone(&factory);
        tokio::spawn(async move {
            let mut ticker = time::interval(ENGINE_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                factory.advance_all(ENGINE_TICK);
            }
        })
    };

    let items: Vec<FeedItem> = (0..args.items)
        .map(|i| FeedItem::new(Uuid::new_v4(), format!("sim://take/{}", i)))
        .collect();
    feed.set_items(items);

    tokio::select! {
        _ = run_session(&mut feed) => {
            info!("Scripted session finished");
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    for snapshot in feed.snapshots() {
        let line = serde_json::to_string(&snapshot).context("Failed to serialize snapshot")?;
        info!("Final cell state: {}", line);
    }

    feed.shutdown();
    clock.abort();
    // Let the logger drain what shutdown emitted
    time::sleep(ENGINE_TICK).await;
    logger.abort();

    info!("stance-player shutdown complete");
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("stance_player={},stance_common={}", level, level))
    });
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Log (or print) every event published on the bus
async fn log_events(bus: EventBus, json: bool) {
    let mut rx = bus.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to serialize {}: {}", event.event_type(), e),
                    }
                } else {
                    info!("Event {}: {:?}", event.event_type(), event);
                }
            }
            Err(RecvError::Lagged(missed)) => warn!("Event logger lagged, {} events lost", missed),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Scripted user session
async fn run_session(feed: &mut Feed) {
    let page = feed.config().page_height;
    let pause = |ms: u64| time::sleep(Duration::from_millis(ms));

    info!("Session: watching item 0");
    pause(1500).await;

    info!("Session: swipe to item 1");
    feed.on_scroll(page * 0.6);
    pause(1000).await;

    info!("Session: toggle mute");
    feed.toggle_mute();
    pause(500).await;

    info!("Session: tap to pause, tap to resume");
    if let Some(index) = feed.active_index() {
        feed.toggle_playback(index);
        pause(700).await;
        feed.toggle_playback(index);
    }
    pause(500).await;

    info!("Session: share sheet open");
    feed.set_interruption(true);
    pause(400).await;
    feed.set_interruption(false);
    pause(500).await;

    info!("Session: fling to item 3");
    feed.on_scroll(page * 3.0);
    pause(1000).await;

    info!("Session: app backgrounded");
    feed.set_focused(false);
    pause(500).await;
    feed.set_focused(true);
    pause(1500).await;
}
