//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use fblur_media::EngineConfig;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root directory for uploads, reference images and artifacts
    pub media_root: PathBuf,
    /// How long a registered face profile survives after the last registration
    pub profile_ttl: Duration,
    /// How long a finished job and its artifact are retained
    pub artifact_ttl: Duration,
    /// Update job progress every N frames
    pub progress_interval: u64,
    /// x264 preset used for encoding
    pub preset: String,
    /// x264 CRF quality
    pub crf: u8,
    /// Override the per-mode reference match threshold
    pub match_threshold: Option<f32>,
    /// Override the per-mode minimum confidence gap
    pub min_confidence_gap: Option<f32>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("/tmp/fblur"),
            profile_ttl: Duration::from_secs(300),
            artifact_ttl: Duration::from_secs(300),
            progress_interval: 10,
            preset: "veryfast".to_string(),
            crf: 23,
            match_threshold: None,
            min_confidence_gap: None,
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            media_root: std::env::var("FBLUR_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/fblur")),
            profile_ttl: Duration::from_secs(
                std::env::var("FBLUR_PROFILE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            artifact_ttl: Duration::from_secs(
                std::env::var("FBLUR_ARTIFACT_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            progress_interval: std::env::var("FBLUR_PROGRESS_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            preset: std::env::var("FBLUR_FFMPEG_PRESET")
                .unwrap_or_else(|_| "veryfast".to_string()),
            crf: std::env::var("FBLUR_FFMPEG_CRF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(23),
            match_threshold: std::env::var("FBLUR_MATCH_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok()),
            min_confidence_gap: std::env::var("FBLUR_MIN_CONFIDENCE_GAP")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Engine knobs derived from this config.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            preset: self.preset.clone(),
            crf: self.crf,
            progress_interval: self.progress_interval,
            match_threshold: self.match_threshold,
            min_confidence_gap: self.min_confidence_gap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.profile_ttl, Duration::from_secs(300));
        assert_eq!(config.artifact_ttl, Duration::from_secs(300));
        assert_eq!(config.crf, 23);
        assert!(config.match_threshold.is_none());
    }

    #[test]
    fn test_engine_config_carries_overrides() {
        let config = ServiceConfig {
            match_threshold: Some(0.5),
            ..Default::default()
        };
        let engine = config.engine_config();
        assert_eq!(engine.match_threshold, Some(0.5));
        assert_eq!(engine.preset, "veryfast");
    }
}
