//! The blur service facade.
//!
//! Single entry point tying together face registration, job submission,
//! polling and artifact retrieval. Callers never touch the store,
//! registry or scheduler directly.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use validator::Validate;

use fblur_media::{FaceDetector, FaceEncoder, ProcessRequest, VideoProcessor};
use fblur_models::{BlurJob, BlurLevel, BlurRequest, JobId, JobState, JobView, UserId};
use fblur_registry::FaceRegistry;

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::scheduler::{prune_dir, ExpirationScheduler};
use crate::storage::MediaStore;
use crate::store::JobStore;
use crate::worker::run_blur_job;

/// Orchestrates the whole blur workflow for one media root.
pub struct BlurService {
    config: ServiceConfig,
    media: MediaStore,
    registry: Arc<FaceRegistry>,
    jobs: Arc<JobStore>,
    scheduler: Arc<ExpirationScheduler>,
    detector: Arc<dyn FaceDetector>,
    encoder: Arc<dyn FaceEncoder>,
    processor: Arc<dyn VideoProcessor>,
}

impl BlurService {
    /// Create a service, preparing the media directory layout.
    pub async fn new(
        config: ServiceConfig,
        detector: Arc<dyn FaceDetector>,
        encoder: Arc<dyn FaceEncoder>,
        processor: Arc<dyn VideoProcessor>,
    ) -> ServiceResult<Self> {
        let media = MediaStore::open(&config.media_root).await?;
        let profile_ttl = chrono::Duration::from_std(config.profile_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        Ok(Self {
            config,
            media,
            registry: Arc::new(FaceRegistry::with_ttl(profile_ttl)),
            jobs: Arc::new(JobStore::new()),
            scheduler: Arc::new(ExpirationScheduler::new()),
            detector,
            encoder,
            processor,
        })
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub fn registry(&self) -> &FaceRegistry {
        &self.registry
    }

    /// Reap stale files across the media directories.
    ///
    /// A safety net under the per-key timers: files whose cleanup was
    /// lost (crash, superseded timer) are swept on the next
    /// registration or submission instead of accumulating.
    async fn sweep_expired_files(&self) {
        let targets = [
            (self.media.reference_dir(), self.config.profile_ttl),
            (self.media.uploads_dir(), self.config.artifact_ttl),
            (self.media.processed_dir(), self.config.artifact_ttl),
        ];
        let swept = tokio::task::spawn_blocking(move || {
            let mut removed = 0;
            for (dir, max_age) in targets {
                match prune_dir(&dir, max_age) {
                    Ok(n) => removed += n,
                    Err(err) => warn!("Sweep of {} failed: {}", dir.display(), err),
                }
            }
            removed
        })
        .await
        .unwrap_or(0);

        if swept > 0 {
            info!("Swept {} stale media files", swept);
        }
    }

    /// Register reference face images for a user.
    ///
    /// Schedules the profile for expiry; registering again pushes the
    /// deadline out and supersedes the pending cleanup.
    pub async fn register_faces(
        &self,
        user_id: &UserId,
        image_paths: &[PathBuf],
    ) -> ServiceResult<usize> {
        if image_paths.is_empty() {
            return Err(ServiceError::validation("No reference images provided"));
        }
        self.sweep_expired_files().await;

        let accepted = self
            .registry
            .register(user_id, image_paths, self.detector.as_ref(), self.encoder.as_ref())
            .await?;

        let registry = self.registry.clone();
        let expire_user = user_id.clone();
        self.scheduler.schedule(
            format!("profile:{user_id}"),
            self.config.profile_ttl,
            async move {
                registry.expire_if_due(&expire_user).await;
            },
        );

        Ok(accepted)
    }

    /// Submit a blur job.
    ///
    /// Validation failures and a missing or expired face profile are
    /// rejected here, before any job record exists. On success the job
    /// is queued and a pending view returned for polling.
    pub async fn submit(&self, request: BlurRequest) -> ServiceResult<JobView> {
        request
            .validate()
            .map_err(|err| ServiceError::validation(err.to_string()))?;
        let blur_level = BlurLevel::new(request.blur_level)
            .ok_or_else(|| ServiceError::validation("blur_level must be between 1 and 10"))?;

        self.sweep_expired_files().await;

        if tokio::fs::metadata(&request.video_path).await.is_err() {
            return Err(ServiceError::validation(format!(
                "Input video not found: {}",
                request.video_path.display()
            )));
        }

        // Resolved up front so a lapsed profile fails fast
        let references = self.registry.lookup(&request.user_id).await?;

        let job = BlurJob::new(
            request.user_id.clone(),
            request.mode,
            blur_level,
            &request.video_path,
        );
        let output_path = self
            .media
            .output_path(&request.video_path, request.mode, &job.id);
        let process_request = ProcessRequest {
            job_id: job.id.clone(),
            mode: job.mode,
            blur_level,
            input_path: request.video_path.clone(),
            output_path,
        };

        let view = JobView::from(&job);
        let job_id = self.jobs.insert(job).await;
        info!(
            job_id = %job_id,
            user_id = %request.user_id,
            mode = %request.mode,
            "Job queued"
        );

        let jobs = self.jobs.clone();
        let processor = self.processor.clone();
        let scheduler = self.scheduler.clone();
        let media = self.media.clone();
        let artifact_ttl = self.config.artifact_ttl;
        tokio::spawn(async move {
            run_blur_job(jobs.clone(), processor, process_request, references).await;

            // Retention clock starts at the terminal state, success or not
            let cleanup_id = job_id.clone();
            scheduler.schedule(format!("job:{job_id}"), artifact_ttl, async move {
                if let Ok(job) = jobs.get(&cleanup_id).await {
                    if let Some(artifact) = &job.output_path {
                        if let Err(err) = media.delete(artifact).await {
                            warn!(job_id = %cleanup_id, "Artifact cleanup failed: {}", err);
                        }
                    }
                }
                jobs.remove(&cleanup_id).await;
            });
        });

        Ok(view)
    }

    /// Snapshot a job for polling.
    pub async fn status(&self, job_id: &JobId) -> ServiceResult<JobView> {
        self.jobs.view(job_id).await
    }

    /// Path to the finished artifact.
    ///
    /// Available if and only if the job completed.
    pub async fn artifact(&self, job_id: &JobId) -> ServiceResult<PathBuf> {
        let job = self.jobs.get(job_id).await?;
        match (job.state, job.output_path) {
            (JobState::Completed, Some(path)) => Ok(path),
            (JobState::Failed, _) => Err(ServiceError::Processing(
                job.error_message
                    .unwrap_or_else(|| "Processing failed".to_string()),
            )),
            _ => Err(ServiceError::validation(format!(
                "Job '{job_id}' is still {}",
                job.state
            ))),
        }
    }
}
