//! Playback-related type definitions
//!
//! Supporting types for per-cell scheduler state.

use serde::{Deserialize, Serialize};

/// Scheduler state of one feed cell
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    /// Not the active cell; handle paused (or never started)
    #[default]
    Inactive,
    /// Became active, `play()` issued, engine not ready yet
    ActivatingBuffering,
    /// Active and playing (or intended to play with a ready engine)
    ActivePlaying,
    /// Active but paused by a user tap
    ManuallyPaused,
    /// Enforcement suspended by an external preemption
    Interrupted,
}

impl CellState {
    /// True for the states in which the cell intends to play
    pub fn is_active_playback(&self) -> bool {
        matches!(self, CellState::ActivatingBuffering | CellState::ActivePlaying)
    }
}

impl std::fmt::Display for CellState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellState::Inactive => write!(f, "inactive"),
            CellState::ActivatingBuffering => write!(f, "activating_buffering"),
            CellState::ActivePlaying => write!(f, "active_playing"),
            CellState::ManuallyPaused => write!(f, "manually_paused"),
            CellState::Interrupted => write!(f, "interrupted"),
        }
    }
}
