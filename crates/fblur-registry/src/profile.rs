//! Reference profile data.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use fblur_models::{Embedding, UserId};

/// One user's registered reference faces.
///
/// A profile with zero embeddings is invalid and never stored; repeated
/// registration appends embeddings and pushes the deadline out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceProfile {
    pub user_id: UserId,
    pub embeddings: Vec<Embedding>,
    pub image_paths: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReferenceProfile {
    /// Create a profile with an initial set of embeddings.
    pub fn new(user_id: UserId, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            embeddings: Vec::new(),
            image_paths: Vec::new(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Whether the deadline elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Reset the expiry deadline relative to now.
    pub fn touch(&mut self, ttl: Duration) {
        self.expires_at = Utc::now() + ttl;
    }
}
