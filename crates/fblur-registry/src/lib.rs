//! Per-user reference face profiles with expiry.
//!
//! The registry stores the embeddings a user registered as "this is my
//! face". Profiles expire a fixed time after the last registration and
//! are evicted lazily on lookup; the expiration scheduler additionally
//! sweeps them on a timer.

pub mod error;
pub mod profile;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use profile::ReferenceProfile;
pub use registry::FaceRegistry;
