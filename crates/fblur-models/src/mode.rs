//! Processing mode and blur intensity.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How thoroughly a video is analyzed.
///
/// `Fast` samples every other frame and trades recall for precision;
/// `Detailed` analyzes every frame and can rely on hysteresis across
/// more observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlurMode {
    /// Sample every 2nd frame, hold the previous decision in between
    Fast,
    /// Analyze every frame
    #[default]
    Detailed,
}

impl BlurMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlurMode::Fast => "fast",
            BlurMode::Detailed => "detailed",
        }
    }
}

impl fmt::Display for BlurMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blur intensity on an ordinal 1-10 scale.
///
/// Higher levels widen the blurred region and add extra smoothing passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct BlurLevel(u8);

impl BlurLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// Create a blur level, rejecting values outside 1-10.
    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&level).then_some(Self(level))
    }

    /// Create a blur level, clamping out-of-range values.
    pub fn clamped(level: i64) -> Self {
        Self(level.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for BlurLevel {
    fn default() -> Self {
        Self(5)
    }
}

impl fmt::Display for BlurLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serde() {
        assert_eq!(serde_json::to_string(&BlurMode::Fast).unwrap(), "\"fast\"");
        let mode: BlurMode = serde_json::from_str("\"detailed\"").unwrap();
        assert_eq!(mode, BlurMode::Detailed);
    }

    #[test]
    fn test_blur_level_bounds() {
        assert!(BlurLevel::new(0).is_none());
        assert!(BlurLevel::new(11).is_none());
        assert_eq!(BlurLevel::new(10).unwrap().get(), 10);
        assert_eq!(BlurLevel::clamped(42).get(), 10);
        assert_eq!(BlurLevel::clamped(-3).get(), 1);
    }
}
