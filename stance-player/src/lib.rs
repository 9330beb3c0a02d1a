//! # Stance Feed Playback Scheduler (stance-player)
//!
//! Decides which single video in a virtualized vertical feed may play and
//! keeps one playback engine handle per mounted cell converged toward that
//! decision.
//!
//! **Purpose:** single-active-cell scheduling, shared mute propagation,
//! self-healing reconciliation, loop-aware progress, and interruption
//! handling around external preemptions.
//!
//! **Architecture:** one tokio reconcile task per mounted cell (interval
//! tick + engine events), coordinated by [`playback::Feed`]; observers
//! subscribe to the [`stance_common::events::EventBus`] and per-cell
//! `watch` channels.

pub mod config;
pub mod error;
pub mod playback;

pub use config::{Config, ConfigOverrides, ProgressStrategy, SchedulerConfig};
pub use error::{Error, Result};
pub use playback::{Feed, FeedItem, MuteState, PlaybackCell};
