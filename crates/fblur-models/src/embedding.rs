//! Face embedding vectors and distance math.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Fixed-length numeric vector representing one face.
///
/// Embeddings are compared by Euclidean distance; smaller means more
/// similar. The vector dimensionality is fixed by the encoder that
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap a raw vector.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Vector dimensionality.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance to another embedding.
    ///
    /// Mismatched dimensionalities compare as infinitely far apart, so a
    /// stray vector from a different encoder can never match anything.
    pub fn distance(&self, other: &Embedding) -> f32 {
        if self.0.is_empty() || self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    /// Exponential blend toward a newer observation.
    ///
    /// Returns `alpha * self + (1 - alpha) * other`; higher alpha keeps
    /// more history and damps single-frame identity drift.
    pub fn blend(&self, alpha: f32, other: &Embedding) -> Embedding {
        if self.0.len() != other.0.len() {
            return self.clone();
        }
        Embedding(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| a * alpha + b * (1.0 - alpha))
                .collect(),
        )
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}
