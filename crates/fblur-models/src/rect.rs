//! Pixel-space bounding boxes for face detections.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Center y-coordinate.
    #[inline]
    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Compute Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Return a new box expanded by a ratio of its own size on every side.
    pub fn expand(&self, ratio: f64) -> BoundingBox {
        BoundingBox {
            x: self.x - self.width * ratio,
            y: self.y - self.height * ratio,
            width: self.width * (1.0 + 2.0 * ratio),
            height: self.height * (1.0 + 2.0 * ratio),
        }
    }

    /// Midpoint blend of two boxes, used for temporal smoothing of a track.
    pub fn blend(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            width: (self.width + other.width) / 2.0,
            height: (self.height + other.height) / 2.0,
        }
    }

    /// Clamp box to frame boundaries, keeping at least a 1x1 region.
    pub fn clamp(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let fw = (frame_width.max(1)) as f64;
        let fh = (frame_height.max(1)) as f64;

        let x = self.x.max(0.0).min(fw - 1.0);
        let y = self.y.max(0.0).min(fh - 1.0);
        let width = self.width.max(1.0).min(fw - x);
        let height = self.height.max(1.0).min(fh - y);

        BoundingBox { x, y, width, height }
    }
}
