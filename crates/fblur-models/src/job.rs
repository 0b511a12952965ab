//! Blur job records and lifecycle states.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{BlurLevel, BlurMode};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used in output file names.
    ///
    /// Truncates on a character boundary, so ids constructed from
    /// arbitrary strings are safe too.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the user who owns a reference profile and its jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
///
/// Transitions are one-directional: `Pending -> Running -> Completed | Failed`.
/// Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job created, worker not yet dispatched
    #[default]
    Pending,
    /// Worker is processing frames
    Running,
    /// Finished successfully, artifact available
    Completed,
    /// Aborted with an error message
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One blur request and its observable progress.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BlurJob {
    /// Unique job ID
    pub id: JobId,

    /// Owning user
    pub user_id: UserId,

    /// Processing mode
    pub mode: BlurMode,

    /// Blur intensity
    pub blur_level: BlurLevel,

    /// Lifecycle state
    #[serde(default)]
    pub state: JobState,

    /// Completion percentage (0-100, non-decreasing while running)
    #[serde(default)]
    pub progress: f32,

    /// Human-readable status message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Uploaded input video
    pub input_path: PathBuf,

    /// Final artifact, set only on successful completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BlurJob {
    /// Create a new pending job.
    pub fn new(
        user_id: UserId,
        mode: BlurMode,
        blur_level: BlurLevel,
        input_path: impl Into<PathBuf>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id,
            mode,
            blur_level,
            state: JobState::Pending,
            progress: 0.0,
            message: None,
            input_path: input_path.into(),
            output_path: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark the job as running. No-op once terminal.
    pub fn start(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Mark the job as completed with its artifact location.
    pub fn complete(&mut self, output_path: impl Into<PathBuf>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = JobState::Completed;
        self.progress = 100.0;
        self.output_path = Some(output_path.into());
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Mark the job as failed. Clears any artifact location.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        let error = error.into();
        self.state = JobState::Failed;
        self.output_path = None;
        self.message = Some(error.clone());
        self.error_message = Some(error);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Raise progress. Values below the current progress are ignored so
    /// pollers always observe a non-decreasing sequence.
    pub fn set_progress(&mut self, progress: f32) {
        if self.state.is_terminal() {
            return;
        }
        let clamped = progress.clamp(0.0, 100.0);
        if clamped > self.progress {
            self.progress = clamped;
            self.updated_at = Utc::now();
        }
    }

    /// Replace the status message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.message = Some(message.into());
        self.updated_at = Utc::now();
    }
}

/// Partial update applied atomically by the worker through the job store.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub state: Option<JobState>,
    pub progress: Option<f32>,
    pub message: Option<String>,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn progress(progress: f32) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn progress_with_message(progress: f32, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}
