//! Background tasks owned by a playback cell
//!
//! Each mounted cell runs one reconcile task: a fixed-interval tick that
//! converges engine truth toward the cell's intent, plus immediate handling
//! of engine events. Ending an interruption additionally spawns a one-shot
//! settle task that holds only a weak reference to the cell.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::cell::CellShared;
use super::engine::EngineEvent;

enum Wake {
    Tick,
    Event(std::result::Result<EngineEvent, RecvError>),
}

/// Start the reconcile task for a freshly mounted cell
pub(super) fn spawn_reconcile_task(
    runtime: &Handle,
    cell: Arc<CellShared>,
    events: broadcast::Receiver<EngineEvent>,
) -> JoinHandle<()> {
    runtime.spawn(reconcile_loop(cell, events))
}

async fn reconcile_loop(cell: Arc<CellShared>, events: broadcast::Receiver<EngineEvent>) {
    let period = cell.reconcile_interval();
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events = Some(events);

    debug!(
        "Reconcile task started for item {} ({}ms interval)",
        cell.item_id(),
        period.as_millis()
    );

    loop {
        let wake = tokio::select! {
            _ = ticker.tick() => Wake::Tick,
            event = next_event(&mut events) => Wake::Event(event),
        };

        if !cell.is_alive() {
            break;
        }

        match wake {
            Wake::Tick => {}
            Wake::Event(Ok(event)) => cell.handle_engine_event(&event),
            Wake::Event(Err(RecvError::Lagged(missed))) => {
                warn!(
                    "Item {} missed {} engine events, relying on reconciliation",
                    cell.item_id(),
                    missed
                );
            }
            Wake::Event(Err(RecvError::Closed)) => {
                debug!("Engine event stream closed for item {}", cell.item_id());
                events = None;
            }
        }

        cell.reconcile();
    }

    debug!("Reconcile task stopped for item {}", cell.item_id());
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<EngineEvent>>,
) -> std::result::Result<EngineEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Schedule the end of an interruption window after the settle delay
pub(super) fn spawn_settle_task(
    runtime: &Handle,
    cell: Weak<CellShared>,
    generation: u64,
    delay: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        time::sleep(delay).await;
        match cell.upgrade() {
            Some(cell) => cell.finish_interruption(generation),
            None => trace!("Settle timer fired after cell was dropped"),
        }
    })
}
