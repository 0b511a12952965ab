//! Per-frame classification output.

use serde::{Deserialize, Serialize};

use crate::rect::BoundingBox;

/// Which detections in one frame belong to the owner vs. everyone else.
///
/// Owner boxes are left untouched, every other box is blurred. The
/// decision is ephemeral and never persisted; in fast mode the engine
/// reuses the previous frame's decision on unsampled frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameDecision {
    /// Boxes classified as the registered owner (leave unblurred)
    pub owner: Vec<BoundingBox>,
    /// Boxes classified as other people (blur)
    pub other: Vec<BoundingBox>,
}

impl FrameDecision {
    /// Empty decision, emitted for frames with no detections.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_empty() && self.other.is_empty()
    }

    /// Total number of classified boxes.
    pub fn len(&self) -> usize {
        self.owner.len() + self.other.len()
    }
}
