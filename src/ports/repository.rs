use crate::domain::{Job, Preset};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error("preset {0} not found")]
    PresetNotFound(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// System of record for submitted jobs.
///
/// Writes are unconditional overwrites; concurrent writers to one id race and
/// the last write wins. Records may expire under the store's retention policy,
/// after which they read as not found.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_job(&self, id: &str) -> Result<Job, RepositoryError>;

    async fn put_job(&self, id: &str, job: &Job) -> Result<(), RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresetRepository: Send + Sync {
    async fn put_preset(&self, preset: &Preset) -> Result<(), RepositoryError>;

    async fn get_preset(&self, name: &str) -> Result<Preset, RepositoryError>;

    async fn delete_preset(&self, name: &str) -> Result<(), RepositoryError>;

    /// All presets, sorted by name.
    async fn list_presets(&self) -> Result<Vec<Preset>, RepositoryError>;
}
