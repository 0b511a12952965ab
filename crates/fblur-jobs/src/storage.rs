//! Local media storage layout.

use std::path::{Path, PathBuf};
use tracing::debug;

use fblur_models::{BlurMode, JobId};

use crate::error::ServiceResult;

/// Filesystem layout for uploads, reference images and artifacts.
///
/// Everything lives under one media root:
/// `reference_faces/` for registration images, `uploads/` for input
/// videos and `processed/` for finished artifacts.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Open the store, creating the directory layout if needed.
    pub async fn open(root: impl Into<PathBuf>) -> ServiceResult<Self> {
        let store = Self { root: root.into() };
        for dir in [
            store.reference_dir(),
            store.uploads_dir(),
            store.processed_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        debug!("Media store ready at {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reference_dir(&self) -> PathBuf {
        self.root.join("reference_faces")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// Artifact path for a job, derived from the input file name.
    ///
    /// `holiday.mp4` processed in fast mode becomes
    /// `processed/holiday_fast_<job prefix>.mp4`.
    pub fn output_path(&self, input: &Path, mode: BlurMode, job_id: &JobId) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let ext = input
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("mp4");
        self.processed_dir()
            .join(format!("{stem}_{mode}_{}.{ext}", job_id.short()))
    }

    /// Persist uploaded bytes under the given directory.
    pub async fn save(&self, dir: &Path, file_name: &str, bytes: &[u8]) -> ServiceResult<PathBuf> {
        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Read a stored file.
    pub async fn read(&self, path: &Path) -> ServiceResult<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    /// Delete a file if it exists. Idempotent.
    pub async fn delete(&self, path: &Path) -> ServiceResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::open(dir.path()).await.unwrap();
        assert!(store.reference_dir().is_dir());
        assert!(store.uploads_dir().is_dir());
        assert!(store.processed_dir().is_dir());
    }

    #[tokio::test]
    async fn test_output_path_naming() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::open(dir.path()).await.unwrap();
        let job_id = JobId::from_string("abcdef1234567890");

        let out = store.output_path(Path::new("/up/holiday.mp4"), BlurMode::Fast, &job_id);
        assert_eq!(
            out.file_name().unwrap().to_str().unwrap(),
            "holiday_fast_abcdef12.mp4"
        );
    }

    #[tokio::test]
    async fn test_save_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::open(dir.path()).await.unwrap();

        let path = store
            .save(&store.uploads_dir(), "v.mp4", b"data")
            .await
            .unwrap();
        assert_eq!(store.read(&path).await.unwrap(), b"data");
        assert!(store.delete(&path).await.unwrap());
        assert!(!store.delete(&path).await.unwrap());
    }
}
