//! FFmpeg CLI wrapper and the selective face-blur pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and process management
//! - FFprobe-based video inspection
//! - Raw RGB24 frame streaming (decode and encode) over FFmpeg pipes
//! - Capability traits for face detection and embedding extraction
//! - The hysteresis frame classifier that separates the registered
//!   owner from everyone else
//! - Region blurring and audio remuxing

pub mod blur;
pub mod classify;
pub mod command;
pub mod detect;
pub mod engine;
pub mod error;
pub mod frames;
pub mod probe;
pub mod remux;

pub use blur::apply_blur;
pub use classify::{ClassifierConfig, FaceObservation, FrameClassifier, TrackState};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use detect::{FaceDetector, FaceEncoder};
pub use engine::{
    sampled_frame_count, BlurEngine, EngineConfig, ProcessRequest, ProcessSummary, ProgressSink,
    VideoProcessor,
};
pub use error::{MediaError, MediaResult};
pub use frames::{FrameReader, FrameSink, FrameSource, FrameView, FrameWriter};
pub use probe::{probe_video, VideoInfo};
pub use remux::mux_audio;
