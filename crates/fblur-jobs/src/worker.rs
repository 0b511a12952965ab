//! Background execution of blur jobs.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use fblur_media::{ProcessRequest, ProgressSink, VideoProcessor};
use fblur_models::{Embedding, JobState, JobUpdate};

use crate::store::JobStore;

/// Forwards engine progress into the job store.
///
/// [`ProgressSink::update`] is synchronous, so updates go through a
/// channel and a forwarding task applies them in order. Monotonicity is
/// enforced by the job record itself, a late write can never roll the
/// bar back.
struct ChannelProgress {
    tx: mpsc::UnboundedSender<JobUpdate>,
}

impl ProgressSink for ChannelProgress {
    fn update(&self, progress: f32, message: Option<String>) {
        let update = match message {
            Some(message) => JobUpdate::progress_with_message(progress, message),
            None => JobUpdate::progress(progress),
        };
        // Receiver gone means the job is already torn down
        let _ = self.tx.send(update);
    }
}

/// Drive one job from `Running` to a terminal state.
///
/// Every exit path lands the job in `Completed` or `Failed`; a job is
/// never left `Running` after this returns.
pub async fn run_blur_job(
    store: Arc<JobStore>,
    processor: Arc<dyn VideoProcessor>,
    request: ProcessRequest,
    references: Vec<Embedding>,
) -> JobState {
    let job_id = request.job_id.clone();

    if let Err(err) = store
        .update(
            &job_id,
            JobUpdate {
                state: Some(JobState::Running),
                message: Some("Processing started".to_string()),
                ..Default::default()
            },
        )
        .await
    {
        error!(job_id = %job_id, "Could not start job: {}", err);
        return JobState::Failed;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let forwarder = {
        let store = store.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                if let Err(err) = store.update(&job_id, update).await {
                    warn!(job_id = %job_id, "Dropping progress update: {}", err);
                }
            }
        })
    };

    let sink = ChannelProgress { tx };
    let result = processor.process(&request, references, &sink).await;
    drop(sink);
    // Drain queued progress before writing the terminal state
    let _ = forwarder.await;

    match result {
        Ok(summary) => {
            let update = JobUpdate {
                state: Some(JobState::Completed),
                output_path: Some(summary.output_path.clone()),
                message: Some("Done".to_string()),
                ..Default::default()
            };
            if let Err(err) = store.update(&job_id, update).await {
                error!(job_id = %job_id, "Could not complete job: {}", err);
                return JobState::Failed;
            }
            counter!("fblur_jobs_completed_total").increment(1);
            info!(
                job_id = %job_id,
                "Job completed, artifact at {}",
                summary.output_path.display()
            );
            JobState::Completed
        }
        Err(err) => {
            error!(job_id = %job_id, "Job failed: {}", err);
            let update = JobUpdate {
                state: Some(JobState::Failed),
                error_message: Some(err.to_string()),
                ..Default::default()
            };
            if let Err(err) = store.update(&job_id, update).await {
                error!(job_id = %job_id, "Could not record failure: {}", err);
            }
            counter!("fblur_jobs_failed_total").increment(1);
            JobState::Failed
        }
    }
}

/// Spawn [`run_blur_job`] on the runtime.
pub fn spawn_blur_job(
    store: Arc<JobStore>,
    processor: Arc<dyn VideoProcessor>,
    request: ProcessRequest,
    references: Vec<Embedding>,
) -> JoinHandle<JobState> {
    tokio::spawn(run_blur_job(store, processor, request, references))
}
