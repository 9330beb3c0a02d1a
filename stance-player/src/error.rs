//! Error types for stance-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Only construction and configuration failures are returned to callers.
//! Scheduler-internal races (`StaleHandle`, `InterruptionRace`) are
//! represented here so they can be logged uniformly, but the scheduler
//! treats them as no-ops and never propagates them.

use thiserror::Error;

/// Main error type for stance-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors from the shared library (config file discovery, parsing)
    #[error(transparent)]
    Common(#[from] stance_common::Error),

    /// Invalid argument to a scheduler operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Playback engine reported a decode/network error for an item
    #[error("Engine error for item {item_id}: {message}")]
    Engine {
        item_id: uuid::Uuid,
        message: String,
    },

    /// Tick or event fired after the owning cell was unmounted
    #[error("Stale handle for item {0}")]
    StaleHandle(uuid::Uuid),

    /// Interruption close arrived without a matching open
    #[error("Interruption close without open for item {0}")]
    InterruptionRace(uuid::Uuid),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using stance-player Error
pub type Result<T> = std::result::Result<T, Error>;
