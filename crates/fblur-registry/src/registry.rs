//! In-memory registry of reference face profiles.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use fblur_media::{FaceDetector, FaceEncoder, FrameView, MediaError};
use fblur_models::{BoundingBox, Embedding, UserId};

use crate::error::{RegistryError, RegistryResult};
use crate::profile::ReferenceProfile;

/// Default time-to-live after the last registration activity.
pub const DEFAULT_PROFILE_TTL_SECS: i64 = 300;

/// A dominant face must be at least this much larger than the runner-up.
const DOMINANCE_RATIO: f64 = 2.0;

/// Thread-safe store of per-user reference profiles.
///
/// Reads clone the embeddings out, so no caller ever holds a reference
/// into the map while a registration rewrites it.
pub struct FaceRegistry {
    profiles: RwLock<HashMap<UserId, ReferenceProfile>>,
    ttl: Duration,
}

impl FaceRegistry {
    /// Create a registry with the default 300 second profile TTL.
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_PROFILE_TTL_SECS))
    }

    /// Create a registry with a custom profile TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register reference images for a user.
    ///
    /// Each image must contain exactly one dominant face; images that
    /// don't are skipped with a log line rather than failing the call.
    /// Accepted embeddings are appended to the user's live profile and
    /// the expiry deadline is reset. Fails only when not a single image
    /// was usable.
    pub async fn register(
        &self,
        user_id: &UserId,
        images: &[PathBuf],
        detector: &dyn FaceDetector,
        encoder: &dyn FaceEncoder,
    ) -> RegistryResult<usize> {
        let mut embeddings = Vec::new();
        let mut paths = Vec::new();
        for path in images {
            if let Some(embedding) = self.embed_reference(path, detector, encoder).await? {
                embeddings.push(embedding);
                paths.push(path.clone());
            }
        }

        if embeddings.is_empty() {
            return Err(RegistryError::NoFaceAccepted);
        }
        let count = embeddings.len();

        let mut profiles = self.profiles.write().await;
        let now = Utc::now();
        let profile = profiles
            .entry(user_id.clone())
            .or_insert_with(|| ReferenceProfile::new(user_id.clone(), self.ttl));
        if profile.is_expired(now) {
            // Stale leftover from a lapsed registration; start fresh
            *profile = ReferenceProfile::new(user_id.clone(), self.ttl);
        }
        profile.embeddings.extend(embeddings);
        profile.image_paths.extend(paths);
        profile.touch(self.ttl);

        info!(
            user_id = %user_id,
            "Registered {} reference embedding(s), profile now holds {}",
            count,
            profile.embeddings.len()
        );
        Ok(count)
    }

    /// Fetch the live embeddings for a user.
    ///
    /// The common case holds only the read lock, so concurrent lookups
    /// never serialize. An expired profile upgrades to the write lock
    /// for eviction and is reported as expired.
    pub async fn lookup(&self, user_id: &UserId) -> RegistryResult<Vec<Embedding>> {
        {
            let profiles = self.profiles.read().await;
            match profiles.get(user_id) {
                None => return Err(RegistryError::ProfileNotFound(user_id.to_string())),
                Some(profile) if !profile.is_expired(Utc::now()) => {
                    return Ok(profile.embeddings.clone());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a registration may have
        // refreshed the profile between the locks
        let mut profiles = self.profiles.write().await;
        match profiles.get(user_id) {
            None => Err(RegistryError::ProfileNotFound(user_id.to_string())),
            Some(profile) if profile.is_expired(Utc::now()) => {
                profiles.remove(user_id);
                debug!(user_id = %user_id, "Evicted expired profile on lookup");
                Err(RegistryError::ProfileExpired(user_id.to_string()))
            }
            Some(profile) => Ok(profile.embeddings.clone()),
        }
    }

    /// Evict a profile unconditionally. Idempotent on missing users.
    pub async fn expire(&self, user_id: &UserId) -> bool {
        let removed = self.profiles.write().await.remove(user_id).is_some();
        if removed {
            info!(user_id = %user_id, "Face profile removed");
        }
        removed
    }

    /// Evict a profile only if its deadline has actually elapsed.
    ///
    /// Used by scheduled cleanup so a timer racing a re-registration
    /// never deletes a refreshed profile.
    pub async fn expire_if_due(&self, user_id: &UserId) -> bool {
        let mut profiles = self.profiles.write().await;
        match profiles.get(user_id) {
            Some(profile) if profile.is_expired(Utc::now()) => {
                profiles.remove(user_id);
                info!(user_id = %user_id, "Expired face profile removed");
                true
            }
            _ => false,
        }
    }

    /// Number of stored profiles (live or not yet swept).
    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }

    /// Drop all profiles.
    pub async fn clear(&self) {
        self.profiles.write().await.clear();
    }

    /// Decode one reference image and compute its face embedding.
    ///
    /// Returns `Ok(None)` with a log line for every skippable reason:
    /// unreadable file, zero faces, no dominant face, unencodable face.
    async fn embed_reference(
        &self,
        path: &Path,
        detector: &dyn FaceDetector,
        encoder: &dyn FaceEncoder,
    ) -> RegistryResult<Option<Embedding>> {
        let owned = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || image::open(owned).map(|i| i.to_rgb8()))
            .await
            .map_err(|e| MediaError::internal(format!("Image decode task failed: {e}")))?;

        let rgb = match decoded {
            Ok(rgb) => rgb,
            Err(err) => {
                warn!("Skipping unreadable reference image {}: {}", path.display(), err);
                return Ok(None);
            }
        };
        let (width, height) = rgb.dimensions();
        let data = rgb.into_raw();
        let view = FrameView::new(&data, width, height)
            .ok_or_else(|| MediaError::internal("Decoded image buffer size mismatch"))?;

        let boxes = match detector.detect(&view).await {
            Ok(boxes) => boxes,
            Err(err) if !err.is_structural() => {
                warn!("Skipping reference image {}: {}", path.display(), err);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let Some(bbox) = dominant_face(&boxes) else {
            warn!(
                "Skipping reference image {}: expected one dominant face, found {}",
                path.display(),
                boxes.len()
            );
            return Ok(None);
        };

        match encoder.encode(&view, &bbox).await {
            Ok(Some(embedding)) => Ok(Some(embedding)),
            Ok(None) => {
                warn!(
                    "Skipping reference image {}: face could not be encoded",
                    path.display()
                );
                Ok(None)
            }
            Err(err) if !err.is_structural() => {
                warn!("Skipping reference image {}: {}", path.display(), err);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Default for FaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the single dominant face, if there is one.
///
/// One detection wins outright; with several, the largest must be at
/// least [`DOMINANCE_RATIO`] times the runner-up's area, otherwise the
/// image is ambiguous and rejected.
fn dominant_face(boxes: &[BoundingBox]) -> Option<BoundingBox> {
    match boxes {
        [] => None,
        [single] => Some(*single),
        _ => {
            let mut sorted: Vec<&BoundingBox> = boxes.iter().collect();
            sorted.sort_by(|a, b| b.area().total_cmp(&a.area()));
            (sorted[0].area() >= DOMINANCE_RATIO * sorted[1].area()).then(|| *sorted[0])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fblur_media::MediaResult;
    use image::RgbImage;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Detector returning a canned box list per call.
    struct FakeDetector {
        responses: Mutex<Vec<Vec<BoundingBox>>>,
    }

    impl FakeDetector {
        fn returning(responses: Vec<Vec<BoundingBox>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl FaceDetector for FakeDetector {
        async fn detect(&self, _frame: &FrameView<'_>) -> MediaResult<Vec<BoundingBox>> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(responses.remove(0))
            }
        }
        fn name(&self) -> &'static str {
            "fake"
        }
    }

    struct FakeEncoder;

    #[async_trait]
    impl FaceEncoder for FakeEncoder {
        async fn encode(
            &self,
            _frame: &FrameView<'_>,
            bbox: &BoundingBox,
        ) -> MediaResult<Option<Embedding>> {
            Ok(Some(Embedding::new(vec![bbox.x as f32, bbox.y as f32])))
        }
        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn face(size: f64) -> BoundingBox {
        BoundingBox::new(4.0, 4.0, size, size)
    }

    fn write_image(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::new(32, 32).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_register_single_face_image() {
        let dir = TempDir::new().unwrap();
        let image = write_image(&dir, "ref.png");
        let registry = FaceRegistry::new();
        let user = UserId::new("u1");

        let detector = FakeDetector::returning(vec![vec![face(10.0)]]);
        let count = registry
            .register(&user, &[image], &detector, &FakeEncoder)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let embeddings = registry.lookup(&user).await.unwrap();
        assert_eq!(embeddings.len(), 1);
    }

    #[tokio::test]
    async fn test_register_no_face_fails_validation() {
        let dir = TempDir::new().unwrap();
        let image = write_image(&dir, "empty.png");
        let registry = FaceRegistry::new();
        let user = UserId::new("u1");

        let detector = FakeDetector::returning(vec![vec![]]);
        let err = registry
            .register(&user, &[image], &detector, &FakeEncoder)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoFaceAccepted));
        assert!(registry.lookup(&user).await.is_err());
    }

    #[tokio::test]
    async fn test_register_skips_bad_images_keeps_good() {
        let dir = TempDir::new().unwrap();
        let bad = write_image(&dir, "bad.png");
        let good = write_image(&dir, "good.png");
        let registry = FaceRegistry::new();
        let user = UserId::new("u1");

        // First image has two similar faces (ambiguous), second is clean
        let detector = FakeDetector::returning(vec![
            vec![face(10.0), face(9.0)],
            vec![face(10.0)],
        ]);
        let count = registry
            .register(&user, &[bad, good], &detector, &FakeEncoder)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_reregistration_strictly_grows_profile() {
        let dir = TempDir::new().unwrap();
        let registry = FaceRegistry::new();
        let user = UserId::new("u1");

        let first = write_image(&dir, "a.png");
        let detector = FakeDetector::returning(vec![vec![face(10.0)]]);
        registry
            .register(&user, &[first], &detector, &FakeEncoder)
            .await
            .unwrap();

        let second = write_image(&dir, "b.png");
        let detector = FakeDetector::returning(vec![vec![face(12.0)]]);
        registry
            .register(&user, &[second], &detector, &FakeEncoder)
            .await
            .unwrap();

        let embeddings = registry.lookup(&user).await.unwrap();
        assert_eq!(embeddings.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_profile_is_not_found() {
        let dir = TempDir::new().unwrap();
        let image = write_image(&dir, "ref.png");
        let registry = FaceRegistry::with_ttl(Duration::seconds(0));
        let user = UserId::new("u1");

        let detector = FakeDetector::returning(vec![vec![face(10.0)]]);
        registry
            .register(&user, &[image], &detector, &FakeEncoder)
            .await
            .unwrap();

        let err = registry.lookup(&user).await.unwrap_err();
        assert!(matches!(err, RegistryError::ProfileExpired(_)));
        // Evicted lazily; a second lookup reports plain not-found
        let err = registry.lookup(&user).await.unwrap_err();
        assert!(matches!(err, RegistryError::ProfileNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_the_profile() {
        let dir = TempDir::new().unwrap();
        let image = write_image(&dir, "ref.png");
        let registry = Arc::new(FaceRegistry::new());
        let user = UserId::new("u1");

        let detector = FakeDetector::returning(vec![vec![face(10.0)]]);
        registry
            .register(&user, &[image], &detector, &FakeEncoder)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let user = user.clone();
            handles.push(tokio::spawn(
                async move { registry.lookup(&user).await },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_expire_is_idempotent() {
        let registry = FaceRegistry::new();
        let user = UserId::new("ghost");
        assert!(!registry.expire(&user).await);
        assert!(!registry.expire(&user).await);
    }

    #[tokio::test]
    async fn test_expire_if_due_spares_live_profiles() {
        let dir = TempDir::new().unwrap();
        let image = write_image(&dir, "ref.png");
        let registry = FaceRegistry::new();
        let user = UserId::new("u1");

        let detector = FakeDetector::returning(vec![vec![face(10.0)]]);
        registry
            .register(&user, &[image], &detector, &FakeEncoder)
            .await
            .unwrap();

        assert!(!registry.expire_if_due(&user).await);
        assert!(registry.lookup(&user).await.is_ok());
    }

    #[test]
    fn test_dominant_face_selection() {
        assert!(dominant_face(&[]).is_none());
        assert!(dominant_face(&[face(10.0)]).is_some());
        // Clear dominance: 10x10 vs 5x5 is a 4x area ratio
        assert!(dominant_face(&[face(5.0), face(10.0)]).is_some());
        // Ambiguous: similar sizes
        assert!(dominant_face(&[face(10.0), face(9.0)]).is_none());
    }
}
