//! In-memory job store.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use fblur_models::{BlurJob, JobId, JobUpdate, JobView};

use crate::error::{ServiceError, ServiceResult};

/// Thread-safe store of blur jobs.
///
/// All mutation goes through [`JobStore::update`], which applies a
/// [`JobUpdate`] under one write lock so pollers never observe a
/// half-applied transition (for example a `Completed` state without its
/// output path).
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, BlurJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created job.
    pub async fn insert(&self, job: BlurJob) -> JobId {
        let id = job.id.clone();
        self.jobs.write().await.insert(id.clone(), job);
        id
    }

    /// Snapshot one job for a polling caller.
    pub async fn view(&self, id: &JobId) -> ServiceResult<JobView> {
        let jobs = self.jobs.read().await;
        jobs.get(id)
            .map(JobView::from)
            .ok_or_else(|| ServiceError::not_found(format!("job '{id}'")))
    }

    /// Full record of one job.
    pub async fn get(&self, id: &JobId) -> ServiceResult<BlurJob> {
        let jobs = self.jobs.read().await;
        jobs.get(id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("job '{id}'")))
    }

    /// Apply a partial update atomically.
    ///
    /// State transitions go through the job's own lifecycle methods, so
    /// terminal states stay absorbing and progress stays non-decreasing
    /// no matter what the update carries.
    pub async fn update(&self, id: &JobId, update: JobUpdate) -> ServiceResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| ServiceError::not_found(format!("job '{id}'")))?;

        if let Some(state) = update.state {
            use fblur_models::JobState;
            match state {
                JobState::Running => job.start(),
                JobState::Completed => {
                    if let Some(output) = update.output_path.clone() {
                        job.complete(output);
                    } else {
                        job.fail("Job completed without an output artifact");
                    }
                }
                JobState::Failed => {
                    let reason = update
                        .error_message
                        .clone()
                        .or_else(|| update.message.clone())
                        .unwrap_or_else(|| "Processing failed".to_string());
                    job.fail(reason);
                }
                JobState::Pending => {}
            }
        }
        if let Some(progress) = update.progress {
            job.set_progress(progress);
        }
        if let Some(message) = update.message {
            job.set_message(message);
        }
        Ok(())
    }

    /// Remove a job record. Idempotent.
    pub async fn remove(&self, id: &JobId) -> Option<BlurJob> {
        let removed = self.jobs.write().await.remove(id);
        if removed.is_some() {
            debug!(job_id = %id, "Job record removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fblur_models::{BlurLevel, BlurMode, JobState, UserId};

    fn job() -> BlurJob {
        BlurJob::new(
            UserId::new("u1"),
            BlurMode::Detailed,
            BlurLevel::default(),
            "/tmp/in.mp4",
        )
    }

    #[tokio::test]
    async fn test_insert_and_view() {
        let store = JobStore::new();
        let id = store.insert(job()).await;
        let view = store.view(&id).await.unwrap();
        assert_eq!(view.state, JobState::Pending);
        assert!(view.download_path.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let store = JobStore::new();
        let err = store.view(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_completion_requires_artifact() {
        let store = JobStore::new();
        let id = store.insert(job()).await;

        let update = JobUpdate {
            state: Some(JobState::Completed),
            ..Default::default()
        };
        store.update(&id, update).await.unwrap();

        // Completed without an output path degrades to a failure
        let view = store.view(&id).await.unwrap();
        assert_eq!(view.state, JobState::Failed);
        assert!(view.download_path.is_none());
    }

    #[tokio::test]
    async fn test_update_is_atomic_per_transition() {
        let store = JobStore::new();
        let id = store.insert(job()).await;

        store
            .update(
                &id,
                JobUpdate {
                    state: Some(JobState::Running),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .update(&id, JobUpdate::progress_with_message(40.0, "Processing video"))
            .await
            .unwrap();

        let view = store.view(&id).await.unwrap();
        assert_eq!(view.state, JobState::Running);
        assert_eq!(view.progress, 40.0);
        assert_eq!(view.message.as_deref(), Some("Processing video"));

        // Stale progress from a slow writer never rolls the bar back
        store.update(&id, JobUpdate::progress(20.0)).await.unwrap();
        assert_eq!(store.view(&id).await.unwrap().progress, 40.0);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = JobStore::new();
        let id = store.insert(job()).await;
        assert!(store.remove(&id).await.is_some());
        assert!(store.remove(&id).await.is_none());
        assert!(store.view(&id).await.is_err());
    }
}
