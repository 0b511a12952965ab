//! Shared data models for the FaceBlur backend.
//!
//! This crate provides Serde-serializable types for:
//! - Blur jobs and their lifecycle states
//! - Processing modes and blur intensity
//! - Face bounding boxes and embeddings
//! - Per-frame classification decisions

pub mod decision;
pub mod embedding;
pub mod job;
pub mod mode;
pub mod rect;
pub mod request;

// Re-export common types
pub use decision::FrameDecision;
pub use embedding::Embedding;
pub use job::{BlurJob, JobId, JobState, JobUpdate, UserId};
pub use mode::{BlurLevel, BlurMode};
pub use rect::BoundingBox;
pub use request::{BlurRequest, JobView};
