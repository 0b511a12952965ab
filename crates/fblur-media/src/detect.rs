//! Capability traits for face detection and embedding extraction.
//!
//! The detection and embedding algorithms themselves are external
//! collaborators; the pipeline only depends on these seams. Tests use
//! deterministic fakes.

use async_trait::async_trait;

use fblur_models::{BoundingBox, Embedding};

use crate::error::MediaResult;
use crate::frames::FrameView;

/// Face detection provider.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect faces in one frame, returning their bounding boxes.
    async fn detect(&self, frame: &FrameView<'_>) -> MediaResult<Vec<BoundingBox>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Face embedding provider.
#[async_trait]
pub trait FaceEncoder: Send + Sync {
    /// Encode the face under `bbox` into a fixed-length embedding.
    ///
    /// Returns `Ok(None)` when the crop is degenerate or the encoder
    /// cannot produce a vector for this face; that frame is then treated
    /// as unmatchable rather than failing the job.
    async fn encode(
        &self,
        frame: &FrameView<'_>,
        bbox: &BoundingBox,
    ) -> MediaResult<Option<Embedding>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
