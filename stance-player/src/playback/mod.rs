//! Active-cell playback scheduling
//!
//! The feed decides which single item may play; each mounted cell keeps its
//! engine handle converged toward that decision, the shared mute preference
//! and any interruption in progress.

pub mod cell;
pub mod engine;
pub mod feed;
pub mod interruption;
pub mod mute;
pub mod progress;
mod reconcile;
pub mod scroll;
pub mod simulated;
pub mod types;

pub use cell::PlaybackCell;
pub use engine::{EngineEvent, EngineFactory, EngineHandle, EngineStatus};
pub use feed::Feed;
pub use interruption::{CapturedIntent, InterruptionGuard};
pub use mute::MuteState;
pub use progress::{ProgressAnimator, SampleOutcome};
pub use scroll::{ActiveIndexChange, FeedScrollController};
pub use simulated::{EngineStats, SimulatedEngine, SimulatedEngineFactory};
pub use types::{CellSnapshot, FeedItem};
