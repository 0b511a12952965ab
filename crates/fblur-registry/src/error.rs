//! Error types for registry operations.

use thiserror::Error;

use fblur_media::MediaError;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while managing reference profiles.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Every submitted image was rejected, nothing registered
    #[error("No usable face found in any submitted image")]
    NoFaceAccepted,

    /// No live (non-expired) profile for the user
    #[error("No registered face profile for user '{0}'")]
    ProfileNotFound(String),

    /// The profile existed but its deadline elapsed
    #[error("Face profile for user '{0}' has expired")]
    ProfileExpired(String),

    #[error(transparent)]
    Media(#[from] MediaError),
}
