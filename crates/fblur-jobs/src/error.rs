//! Error types for the job service.

use thiserror::Error;

use fblur_media::MediaError;
use fblur_registry::RegistryError;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced to callers of the blur service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request rejected before a job was created
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown job or user
    #[error("Not found: {0}")]
    NotFound(String),

    /// The requested resource existed but its retention window elapsed
    #[error("Expired: {0}")]
    Expired(String),

    /// Processing-side failure
    #[error("Processing error: {0}")]
    Processing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NoFaceAccepted => Self::Validation(err.to_string()),
            RegistryError::ProfileNotFound(user) => {
                Self::NotFound(format!("face profile for user '{user}'"))
            }
            RegistryError::ProfileExpired(user) => {
                Self::Expired(format!("face profile for user '{user}'"))
            }
            RegistryError::Media(inner) => Self::Processing(inner.to_string()),
        }
    }
}

impl From<MediaError> for ServiceError {
    fn from(err: MediaError) -> Self {
        Self::Processing(err.to_string())
    }
}
