//! Caller-facing request and polling types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::{BlurJob, BlurMode, JobId, JobState, UserId};

/// A request to blur a video for one user.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct BlurRequest {
    /// User whose registered face stays visible
    pub user_id: UserId,

    /// Processing mode
    #[serde(default)]
    pub mode: BlurMode,

    /// Blur intensity, 1-10
    #[validate(range(min = 1, max = 10))]
    pub blur_level: u8,

    /// Uploaded video to process
    pub video_path: PathBuf,
}

/// Snapshot of a job returned to polling callers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobView {
    pub job_id: JobId,
    pub state: JobState,
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set if and only if the job completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<PathBuf>,
}

impl From<&BlurJob> for JobView {
    fn from(job: &BlurJob) -> Self {
        Self {
            job_id: job.id.clone(),
            state: job.state,
            progress: job.progress,
            message: job.message.clone(),
            download_path: job.output_path.clone(),
        }
    }
}
