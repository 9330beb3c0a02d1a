//! Feed item and snapshot types

use serde::{Deserialize, Serialize};
use stance_common::events::CellState;
use uuid::Uuid;

/// One entry of the ordered feed list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Stable identifier (take or response id)
    pub id: Uuid,
    /// Source locator for the video
    pub video_url: String,
}

impl FeedItem {
    pub fn new(id: Uuid, video_url: impl Into<String>) -> Self {
        Self {
            id,
            video_url: video_url.into(),
        }
    }
}

/// Point-in-time read-out of one mounted cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub item_id: Uuid,
    pub index: Option<usize>,
    pub state: CellState,
    pub is_active: bool,
    pub desired_playing: bool,
    pub engine_playing: bool,
    pub muted: bool,
    pub buffering: bool,
    pub failed: bool,
    pub progress: f64,
}
