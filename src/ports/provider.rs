use crate::application::splice::SpliceError;
use crate::domain::downmix::DownmixError;
use crate::domain::pipeline::PipelineError;
use crate::domain::{Capabilities, Job, Status};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("provider job {0} not found")]
    JobNotFound(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Downmix(#[from] DownmixError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Splice(#[from] SpliceError),
    #[error("{program} failed: {message}")]
    Command { program: String, message: String },
    #[error("canceled")]
    Canceled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Contract every execution back-end implements.
///
/// Instances hold configuration only and are shared by every in-flight job,
/// so they must be safe for concurrent use. A job is borrowed for the length
/// of one call and never retained.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Submit the job. Returns a `Queued` status carrying the provider job id.
    /// Calling it twice creates two remote jobs.
    async fn create(&self, job: &Job) -> Result<Status, ProviderError>;

    /// Poll the job. While `Started`, progress never goes down between calls.
    async fn status(&self, job: &Job) -> Result<Status, ProviderError>;

    /// Best-effort cancellation; a finished job stays finished.
    async fn cancel(&self, provider_job_id: &str) -> Result<(), ProviderError>;

    async fn healthcheck(&self) -> Result<(), ProviderError>;

    fn capabilities(&self) -> Capabilities;
}
