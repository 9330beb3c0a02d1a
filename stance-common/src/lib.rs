//! # Stance Common Library
//!
//! Shared code for the Stance feed playback crates including:
//! - Event types (FeedEvent enum) and the EventBus
//! - Cell state definitions shared between scheduler and observers
//! - Configuration file discovery and TOML loading
//! - Duration conversion helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
