//! The video blur engine: frame-by-frame drive of the whole pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{info, warn};

use fblur_models::{BlurLevel, BlurMode, Embedding, FrameDecision, JobId};

use crate::blur::apply_blur;
use crate::classify::{ClassifierConfig, FaceObservation, FrameClassifier, TrackState};
use crate::detect::{FaceDetector, FaceEncoder};
use crate::error::{MediaError, MediaResult};
use crate::frames::{FrameReader, FrameSink, FrameSource, FrameView, FrameWriter};
use crate::probe::{probe_video, VideoInfo};
use crate::remux::mux_audio;

/// Receives progress updates from a running job.
///
/// Implemented by the job manager side; the engine never touches job
/// records directly.
pub trait ProgressSink: Send + Sync {
    fn update(&self, progress: f32, message: Option<String>);
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// x264 preset for the silent intermediate and the final mux
    pub preset: String,
    /// x264 CRF quality
    pub crf: u8,
    /// Update job progress every N frames
    pub progress_interval: u64,
    /// Override the per-mode match threshold
    pub match_threshold: Option<f32>,
    /// Override the per-mode confidence gap
    pub min_confidence_gap: Option<f32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preset: "veryfast".to_string(),
            crf: 23,
            progress_interval: 10,
            match_threshold: None,
            min_confidence_gap: None,
        }
    }
}

/// One processing request handed to the engine by the worker.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub job_id: JobId,
    pub mode: BlurMode,
    pub blur_level: BlurLevel,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

/// Counters accumulated by the frame loop.
#[derive(Debug, Clone, Copy, Default)]
struct FrameStats {
    frames_processed: u64,
    frames_sampled: u64,
    faces_preserved: u64,
    faces_blurred: u64,
}

/// Counters describing a finished run.
#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub frames_processed: u64,
    pub frames_sampled: u64,
    pub faces_preserved: u64,
    pub faces_blurred: u64,
    pub output_path: PathBuf,
}

/// Processes one video end to end.
///
/// The trait is the seam between the job manager and the pipeline, so
/// lifecycle tests can run against a fake without FFmpeg installed.
#[async_trait]
pub trait VideoProcessor: Send + Sync {
    async fn process(
        &self,
        request: &ProcessRequest,
        references: Vec<Embedding>,
        progress: &dyn ProgressSink,
    ) -> MediaResult<ProcessSummary>;
}

/// Production engine: FFmpeg frame streaming, classification, blurring
/// and audio remux.
pub struct BlurEngine {
    detector: Arc<dyn FaceDetector>,
    encoder: Arc<dyn FaceEncoder>,
    config: EngineConfig,
}

impl BlurEngine {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        encoder: Arc<dyn FaceEncoder>,
        config: EngineConfig,
    ) -> Self {
        Self {
            detector,
            encoder,
            config,
        }
    }

    /// Per-mode classifier constants with configured overrides applied.
    pub fn classifier_config(&self, mode: BlurMode) -> ClassifierConfig {
        let mut cfg = ClassifierConfig::for_mode(mode);
        if let Some(threshold) = self.config.match_threshold {
            cfg.match_threshold = threshold;
        }
        if let Some(gap) = self.config.min_confidence_gap {
            cfg.min_confidence_gap = gap;
        }
        cfg
    }

    /// Run the frame loop: sample, classify, blur, write.
    ///
    /// Takes the frame endpoints through their seam traits so the loop
    /// is testable without FFmpeg processes on either side.
    async fn blur_frames(
        &self,
        request: &ProcessRequest,
        references: Vec<Embedding>,
        info: &VideoInfo,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        progress: &dyn ProgressSink,
    ) -> MediaResult<FrameStats> {
        let classifier_config = self.classifier_config(request.mode);
        let stride = classifier_config.detection_stride.max(1) as u64;
        let blur_expand = classifier_config.blur_expand;
        let classifier = FrameClassifier::new(classifier_config, references);
        let mut state = TrackState::new();

        let progress_every = self.config.progress_interval.max(1);
        let mut buf = Vec::new();
        let mut stats = FrameStats::default();
        let mut last_decision = FrameDecision::empty();

        while source.next_frame(&mut buf).await? {
            if stats.frames_processed % stride == 0 {
                let view = FrameView::new(&buf, info.width, info.height)
                    .ok_or_else(|| MediaError::internal("Frame buffer size mismatch"))?;
                let observations = self.observe(&view).await?;
                last_decision = classifier.classify(&mut state, &observations);
                stats.frames_sampled += 1;
            }
            // Unsampled frames reuse the previous decision (hold-last)

            stats.faces_preserved += last_decision.owner.len() as u64;
            for bbox in &last_decision.other {
                if apply_blur(
                    &mut buf,
                    info.width,
                    info.height,
                    bbox,
                    request.blur_level,
                    blur_expand,
                ) {
                    stats.faces_blurred += 1;
                }
            }

            sink.write_frame(&buf).await?;
            stats.frames_processed += 1;

            if stats.frames_processed % progress_every == 0 && info.frame_count > 0 {
                let pct = 5.0 + (stats.frames_processed as f32 / info.frame_count as f32) * 90.0;
                progress.update(
                    pct.min(95.0),
                    Some(format!(
                        "Frame {}/{} (preserved={} blurred={} hits={} misses={} dist={:.3})",
                        stats.frames_processed,
                        info.frame_count,
                        stats.faces_preserved,
                        stats.faces_blurred,
                        state.hits(),
                        state.misses(),
                        state.last_distance(),
                    )),
                );
            }
        }

        Ok(stats)
    }

    /// Detect and encode faces in one sampled frame.
    ///
    /// Detector and encoder hiccups are tolerated as "nothing seen this
    /// frame"; only structural failures abort.
    async fn observe(
        &self,
        view: &crate::frames::FrameView<'_>,
    ) -> MediaResult<Vec<FaceObservation>> {
        let boxes = match self.detector.detect(view).await {
            Ok(boxes) => boxes,
            Err(err) if !err.is_structural() => {
                warn!("Detector error tolerated: {}", err);
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut observations = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let embedding = match self.encoder.encode(view, &bbox).await {
                Ok(embedding) => embedding,
                Err(err) if !err.is_structural() => {
                    warn!("Encoder error tolerated: {}", err);
                    None
                }
                Err(err) => return Err(err),
            };
            observations.push(FaceObservation::new(bbox, embedding));
        }
        Ok(observations)
    }
}

#[async_trait]
impl VideoProcessor for BlurEngine {
    async fn process(
        &self,
        request: &ProcessRequest,
        references: Vec<Embedding>,
        progress: &dyn ProgressSink,
    ) -> MediaResult<ProcessSummary> {
        if references.is_empty() {
            return Err(MediaError::internal("No reference embeddings for job"));
        }

        progress.update(2.0, Some("Preparing face data".to_string()));

        let info = probe_video(&request.input_path).await?;
        info!(
            job_id = %request.job_id,
            mode = %request.mode,
            "Processing {}x{} @ {:.2} fps, ~{} frames, audio={}",
            info.width,
            info.height,
            info.fps,
            info.frame_count,
            info.has_audio
        );

        // Silent intermediate next to the final artifact; removed on
        // every exit path when the guard drops
        let out_dir = request
            .output_path
            .parent()
            .ok_or_else(|| MediaError::internal("Output path has no parent directory"))?;
        let temp = tempfile::Builder::new()
            .prefix("fblur-")
            .suffix(".mp4")
            .tempfile_in(out_dir)?;

        let mut reader = FrameReader::open(&request.input_path, info.width, info.height).await?;
        let mut writer = FrameWriter::open(
            temp.path(),
            info.width,
            info.height,
            info.fps,
            &self.config.preset,
            self.config.crf,
        )
        .await?;

        progress.update(5.0, Some("Processing video".to_string()));

        let stats = self
            .blur_frames(request, references, &info, &mut reader, &mut writer, progress)
            .await?;

        writer.finish().await?;
        reader.finish().await?;

        if stats.frames_processed == 0 {
            return Err(MediaError::InvalidVideo(
                "No frames could be decoded from input".to_string(),
            ));
        }

        progress.update(96.0, Some("Muxing audio".to_string()));
        mux_audio(
            temp.path(),
            &request.input_path,
            &request.output_path,
            &self.config.preset,
            self.config.crf,
        )
        .await?;

        counter!("fblur_frames_processed_total").increment(stats.frames_processed);
        counter!("fblur_faces_preserved_total").increment(stats.faces_preserved);
        counter!("fblur_faces_blurred_total").increment(stats.faces_blurred);

        info!(
            job_id = %request.job_id,
            "Processed {} frames ({} sampled), preserved={} blurred={}",
            stats.frames_processed,
            stats.frames_sampled,
            stats.faces_preserved,
            stats.faces_blurred
        );

        Ok(ProcessSummary {
            frames_processed: stats.frames_processed,
            frames_sampled: stats.frames_sampled,
            faces_preserved: stats.faces_preserved,
            faces_blurred: stats.faces_blurred,
            output_path: request.output_path.clone(),
        })
    }
}

/// How many frames a run with the given stride will sample.
pub fn sampled_frame_count(total_frames: u64, stride: u64) -> u64 {
    if stride == 0 {
        return total_frames;
    }
    total_frames.div_ceil(stride)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_arithmetic() {
        // A 10 second, 30 fps video: detailed samples all 300 frames,
        // fast samples half of them
        let detailed = ClassifierConfig::for_mode(BlurMode::Detailed);
        let fast = ClassifierConfig::for_mode(BlurMode::Fast);
        assert_eq!(sampled_frame_count(300, detailed.detection_stride as u64), 300);
        assert_eq!(sampled_frame_count(300, fast.detection_stride as u64), 150);
        assert_eq!(sampled_frame_count(301, 2), 151);
        assert_eq!(sampled_frame_count(0, 2), 0);
    }

    #[test]
    fn test_classifier_overrides_apply() {
        struct NoopDetector;
        #[async_trait]
        impl FaceDetector for NoopDetector {
            async fn detect(
                &self,
                _frame: &crate::frames::FrameView<'_>,
            ) -> MediaResult<Vec<fblur_models::BoundingBox>> {
                Ok(Vec::new())
            }
            fn name(&self) -> &'static str {
                "noop"
            }
        }
        struct NoopEncoder;
        #[async_trait]
        impl FaceEncoder for NoopEncoder {
            async fn encode(
                &self,
                _frame: &crate::frames::FrameView<'_>,
                _bbox: &fblur_models::BoundingBox,
            ) -> MediaResult<Option<Embedding>> {
                Ok(None)
            }
            fn name(&self) -> &'static str {
                "noop"
            }
        }

        let engine = BlurEngine::new(
            Arc::new(NoopDetector),
            Arc::new(NoopEncoder),
            EngineConfig {
                match_threshold: Some(0.33),
                ..Default::default()
            },
        );

        let cfg = engine.classifier_config(BlurMode::Fast);
        assert!((cfg.match_threshold - 0.33).abs() < 1e-6);
        // Untouched knobs keep their per-mode defaults
        assert!(cfg.require_reference_match);
        assert_eq!(cfg.detection_stride, 2);
    }

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use fblur_models::BoundingBox;

    use crate::frames::frame_len;

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 48;

    /// Fixed number of identical in-memory frames.
    struct StaticFrames {
        remaining: u32,
    }

    #[async_trait]
    impl FrameSource for StaticFrames {
        async fn next_frame(&mut self, buf: &mut Vec<u8>) -> MediaResult<bool> {
            if self.remaining == 0 {
                return Ok(false);
            }
            self.remaining -= 1;
            buf.clear();
            buf.resize(frame_len(WIDTH, HEIGHT), 128);
            Ok(true)
        }
    }

    struct CountingSink {
        written: u64,
    }

    #[async_trait]
    impl FrameSink for CountingSink {
        async fn write_frame(&mut self, _frame: &[u8]) -> MediaResult<()> {
            self.written += 1;
            Ok(())
        }
    }

    fn owner_box() -> BoundingBox {
        BoundingBox::new(8.0, 8.0, 20.0, 20.0)
    }

    fn stranger_box() -> BoundingBox {
        BoundingBox::new(40.0, 8.0, 16.0, 16.0)
    }

    /// Always sees the owner and one stranger, counting invocations.
    struct TwoFaceDetector {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FaceDetector for TwoFaceDetector {
        async fn detect(
            &self,
            _frame: &crate::frames::FrameView<'_>,
        ) -> MediaResult<Vec<BoundingBox>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![owner_box(), stranger_box()])
        }
        fn name(&self) -> &'static str {
            "two-face"
        }
    }

    /// Encodes the owner's box near the reference, the stranger's far away.
    struct PositionEncoder;

    #[async_trait]
    impl FaceEncoder for PositionEncoder {
        async fn encode(
            &self,
            _frame: &crate::frames::FrameView<'_>,
            bbox: &BoundingBox,
        ) -> MediaResult<Option<Embedding>> {
            if bbox.x < 30.0 {
                Ok(Some(Embedding::new(vec![1.0, 0.0])))
            } else {
                Ok(Some(Embedding::new(vec![1.0, 5.0])))
            }
        }
        fn name(&self) -> &'static str {
            "position"
        }
    }

    struct FailingDetector;

    #[async_trait]
    impl FaceDetector for FailingDetector {
        async fn detect(
            &self,
            _frame: &crate::frames::FrameView<'_>,
        ) -> MediaResult<Vec<BoundingBox>> {
            Err(MediaError::detection_failed("transient glitch"))
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct RecordingProgress(Mutex<Vec<f32>>);

    impl ProgressSink for RecordingProgress {
        fn update(&self, progress: f32, _message: Option<String>) {
            self.0.lock().unwrap().push(progress);
        }
    }

    fn request(mode: BlurMode) -> ProcessRequest {
        ProcessRequest {
            job_id: JobId::new(),
            mode,
            blur_level: BlurLevel::default(),
            input_path: PathBuf::from("/tmp/in.mp4"),
            output_path: PathBuf::from("/tmp/out.mp4"),
        }
    }

    fn info(frame_count: u64) -> VideoInfo {
        VideoInfo {
            duration: frame_count as f64 / 30.0,
            width: WIDTH,
            height: HEIGHT,
            fps: 30.0,
            frame_count,
            has_audio: false,
        }
    }

    #[tokio::test]
    async fn test_fast_mode_samples_half_and_holds_decisions() {
        let detector = Arc::new(TwoFaceDetector {
            calls: AtomicUsize::new(0),
        });
        let engine = BlurEngine::new(detector.clone(), Arc::new(PositionEncoder), EngineConfig::default());

        let mut source = StaticFrames { remaining: 10 };
        let mut sink = CountingSink { written: 0 };
        let progress = RecordingProgress(Mutex::new(Vec::new()));

        let stats = engine
            .blur_frames(
                &request(BlurMode::Fast),
                vec![Embedding::new(vec![1.0, 0.0])],
                &info(10),
                &mut source,
                &mut sink,
                &progress,
            )
            .await
            .unwrap();

        // Stride 2: every other frame analyzed, the rest written with
        // the held decision
        assert_eq!(stats.frames_processed, 10);
        assert_eq!(stats.frames_sampled, 5);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 5);
        assert_eq!(sink.written, 10);

        // Owner confirmed on the third sampled frame (promote_hits = 3,
        // processed frame index 4); preserved on that frame, the held
        // frame after it, and every frame through the end
        assert_eq!(stats.faces_preserved, 6);
        // Before confirmation both boxes are blurred, after it only the
        // stranger: 2 * 4 + 1 * 6
        assert_eq!(stats.faces_blurred, 14);

        // Progress stays inside the frame-loop band
        let recorded = progress.0.lock().unwrap();
        assert!(!recorded.is_empty());
        assert!(recorded.iter().all(|p| (5.0..=95.0).contains(p)));
        assert!(recorded.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_detector_failures_are_tolerated_per_frame() {
        let engine = BlurEngine::new(
            Arc::new(FailingDetector),
            Arc::new(PositionEncoder),
            EngineConfig::default(),
        );

        let mut source = StaticFrames { remaining: 10 };
        let mut sink = CountingSink { written: 0 };
        let progress = RecordingProgress(Mutex::new(Vec::new()));

        // A flaky detector never aborts the run; every frame still
        // reaches the output with nothing classified
        let stats = engine
            .blur_frames(
                &request(BlurMode::Detailed),
                vec![Embedding::new(vec![1.0, 0.0])],
                &info(10),
                &mut source,
                &mut sink,
                &progress,
            )
            .await
            .unwrap();

        assert_eq!(stats.frames_processed, 10);
        assert_eq!(stats.frames_sampled, 10);
        assert_eq!(sink.written, 10);
        assert_eq!(stats.faces_preserved, 0);
        assert_eq!(stats.faces_blurred, 0);
    }
}
