//! Job lifecycle, scheduling and the blur service facade.
//!
//! This crate owns everything around the video pipeline:
//! - The in-memory [`JobStore`] polled by callers
//! - Background workers that drive jobs to a terminal state
//! - The [`ExpirationScheduler`] reaping profiles, jobs and artifacts
//! - The local [`MediaStore`] directory layout
//! - [`BlurService`], the single entry point callers talk to

pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod store;
pub mod worker;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use logging::init_logging;
pub use scheduler::{prune_dir, ExpirationScheduler};
pub use service::BlurService;
pub use storage::MediaStore;
pub use store::JobStore;
pub use worker::{run_blur_job, spawn_blur_job};
