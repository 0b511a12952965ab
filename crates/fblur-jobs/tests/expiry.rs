//! End-to-end expiry behavior: profile TTL refresh and artifact reaping.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use fblur_jobs::{BlurService, ServiceConfig, ServiceError};
use fblur_media::{
    FaceDetector, FaceEncoder, FrameView, MediaResult, ProcessRequest, ProcessSummary,
    ProgressSink, VideoProcessor,
};
use fblur_models::{BlurMode, BlurRequest, BoundingBox, Embedding, JobState, UserId};

struct OneFaceDetector;

#[async_trait]
impl FaceDetector for OneFaceDetector {
    async fn detect(&self, _frame: &FrameView<'_>) -> MediaResult<Vec<BoundingBox>> {
        Ok(vec![BoundingBox::new(2.0, 2.0, 8.0, 8.0)])
    }
    fn name(&self) -> &'static str {
        "one-face"
    }
}

struct FixedEncoder;

#[async_trait]
impl FaceEncoder for FixedEncoder {
    async fn encode(
        &self,
        _frame: &FrameView<'_>,
        _bbox: &BoundingBox,
    ) -> MediaResult<Option<Embedding>> {
        Ok(Some(Embedding::new(vec![0.5, 0.5])))
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}

struct InstantProcessor;

#[async_trait]
impl VideoProcessor for InstantProcessor {
    async fn process(
        &self,
        request: &ProcessRequest,
        _references: Vec<Embedding>,
        _progress: &dyn ProgressSink,
    ) -> MediaResult<ProcessSummary> {
        tokio::fs::write(&request.output_path, b"mp4").await?;
        Ok(ProcessSummary {
            frames_processed: 1,
            frames_sampled: 1,
            faces_preserved: 1,
            faces_blurred: 0,
            output_path: request.output_path.clone(),
        })
    }
}

async fn service_with(config: ServiceConfig) -> BlurService {
    BlurService::new(
        config,
        Arc::new(OneFaceDetector),
        Arc::new(FixedEncoder),
        Arc::new(InstantProcessor),
    )
    .await
    .unwrap()
}

fn reference_image(service: &BlurService, name: &str) -> PathBuf {
    let path = service.media().reference_dir().join(name);
    image::RgbImage::new(16, 16).save(&path).unwrap();
    path
}

#[tokio::test]
async fn reregistration_supersedes_scheduled_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(ServiceConfig {
        media_root: dir.path().to_path_buf(),
        profile_ttl: Duration::from_millis(150),
        ..Default::default()
    })
    .await;
    let user = UserId::new("u1");

    let first = reference_image(&service, "a.png");
    service.register_faces(&user, &[first]).await.unwrap();

    // Refresh well before the first deadline
    tokio::time::sleep(Duration::from_millis(80)).await;
    let second = reference_image(&service, "b.png");
    service.register_faces(&user, &[second]).await.unwrap();

    // Past the original deadline the profile is still live with both
    // embeddings, because the refresh replaced the pending cleanup
    tokio::time::sleep(Duration::from_millis(100)).await;
    let embeddings = service.registry().lookup(&user).await.unwrap();
    assert_eq!(embeddings.len(), 2);

    // Past the refreshed deadline it is gone
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(service.registry().lookup(&user).await.is_err());
}

#[tokio::test]
async fn finished_job_and_artifact_are_reaped() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(ServiceConfig {
        media_root: dir.path().to_path_buf(),
        artifact_ttl: Duration::from_millis(100),
        ..Default::default()
    })
    .await;
    let user = UserId::new("u1");

    let reference = reference_image(&service, "me.png");
    service.register_faces(&user, &[reference]).await.unwrap();

    let video = service.media().uploads_dir().join("clip.mp4");
    tokio::fs::write(&video, b"fake video").await.unwrap();

    let view = service
        .submit(BlurRequest {
            user_id: user,
            mode: BlurMode::Detailed,
            blur_level: 5,
            video_path: video,
        })
        .await
        .unwrap();

    let mut artifact = None;
    for _ in 0..100 {
        let view = service.status(&view.job_id).await.unwrap();
        if view.state == JobState::Completed {
            artifact = view.download_path;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let artifact = artifact.expect("job should complete with an artifact");
    assert!(artifact.exists());

    // After the retention window both the file and the record are gone
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!artifact.exists());
    let err = service.status(&view.job_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
