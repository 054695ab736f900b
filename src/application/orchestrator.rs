//! Job lifecycle: submit, describe, cancel.
//!
//! The orchestrator resolves a provider through the registry, delegates the
//! remote call, and keeps the job record in the repository. It does not
//! serialize calls: concurrent calls on one job id race at the repository and
//! the last write wins.

use super::registry::{ProviderRegistry, RegistryError};
use crate::config::Config;
use crate::domain::job::JobError;
use crate::domain::preset::PresetError;
use crate::domain::{Capabilities, Job, Preset, Status};
use crate::ports::provider::{Provider, ProviderError};
use crate::ports::repository::{JobRepository, PresetRepository, RepositoryError};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown provider {0}")]
    UnknownProvider(String),
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error("unknown preset {0}")]
    UnknownPreset(String),
    #[error("preset {0} already exists")]
    PresetExists(String),
    #[error("job {0} was never accepted by its provider")]
    NotSubmitted(String),
    #[error("invalid job: {0}")]
    InvalidJob(#[from] JobError),
    #[error("invalid preset: {0}")]
    InvalidPreset(#[from] PresetError),
    #[error("provider {provider} is misconfigured: {source}")]
    Configuration {
        provider: String,
        #[source]
        source: ProviderError,
    },
    #[error("{operation} failed for job {job_id}: {source}")]
    Remote {
        operation: &'static str,
        job_id: String,
        #[source]
        source: ProviderError,
    },
    #[error("storage error on {key}: {source}")]
    Storage {
        key: String,
        /// Set when a remote job exists that the store failed to record.
        provider_job_id: Option<String>,
        #[source]
        source: RepositoryError,
    },
    #[error("{operation} timed out for {key}")]
    Timeout { operation: &'static str, key: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderDescription {
    pub name: String,
    pub enabled: bool,
    pub capabilities: Capabilities,
    pub health: Health,
}

pub struct OrchestratorService<J, P> {
    registry: ProviderRegistry,
    config: Config,
    jobs: J,
    presets: P,
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl<J, P> OrchestratorService<J, P>
where
    J: JobRepository,
    P: PresetRepository,
{
    pub fn new(registry: ProviderRegistry, config: Config, jobs: J, presets: P) -> Self {
        Self {
            registry,
            config,
            jobs,
            presets,
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Submit a job to its provider and record it.
    ///
    /// If the provider accepted the job but the record could not be stored,
    /// the returned `Storage` error carries the provider job id; the remote
    /// job keeps running and is not canceled.
    pub async fn submit(&self, mut job: Job) -> Result<Job, OrchestratorError> {
        job.validate()?;
        self.resolve_presets(&mut job).await?;
        let provider = self.provider(&job.provider)?;

        let status = self
            .bounded("create", &job.id, provider.create(&job))
            .await?
            .map_err(|source| OrchestratorError::Remote {
                operation: "create",
                job_id: job.id.clone(),
                source,
            })?;
        if status.provider_job_id.is_empty() {
            return Err(OrchestratorError::Remote {
                operation: "create",
                job_id: job.id.clone(),
                source: ProviderError::Backend("provider returned no job id".to_string()),
            });
        }
        job.attach_provider_job(status.provider_job_id.clone(), Utc::now())?;

        let stored = match tokio::time::timeout(
            self.config.call_timeout,
            self.jobs.put_job(&job.id, &job),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Backend(format!(
                "put timed out after {:?}",
                self.config.call_timeout
            ))),
        };
        if let Err(source) = stored {
            error!(
                job_id = %job.id,
                provider = %job.provider,
                provider_job_id = %status.provider_job_id,
                error = %source,
                "Remote job created but not recorded"
            );
            return Err(OrchestratorError::Storage {
                key: job.id.clone(),
                provider_job_id: Some(status.provider_job_id),
                source,
            });
        }

        info!(
            job_id = %job.id,
            provider = %job.provider,
            provider_job_id = %status.provider_job_id,
            outputs = job.outputs.len(),
            "Job submitted"
        );
        Ok(job)
    }

    /// Current status of a recorded job, merged with its persisted metadata.
    pub async fn describe(&self, job_id: &str) -> Result<Status, OrchestratorError> {
        let job = self.load(job_id).await?;
        self.describe_job(&job).await
    }

    /// Ask the provider to cancel, then describe the job again.
    ///
    /// The job record is left in place. A job that finished before the cancel
    /// landed is reported as finished.
    pub async fn cancel(&self, job_id: &str) -> Result<Status, OrchestratorError> {
        let job = self.load(job_id).await?;
        let provider = self.provider(&job.provider)?;
        let provider_job_id = job
            .provider_job_id
            .as_deref()
            .ok_or_else(|| OrchestratorError::NotSubmitted(job.id.clone()))?;

        self.bounded("cancel", &job.id, provider.cancel(provider_job_id))
            .await?
            .map_err(|source| OrchestratorError::Remote {
                operation: "cancel",
                job_id: job.id.clone(),
                source,
            })?;
        info!(job_id = %job.id, provider_job_id, "Cancel requested");

        self.describe_job(&job).await
    }

    pub fn providers(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Capabilities and health of one provider.
    ///
    /// A provider whose factory rejects its configuration is reported as
    /// disabled rather than failing the call.
    pub async fn describe_provider(
        &self,
        name: &str,
    ) -> Result<ProviderDescription, OrchestratorError> {
        let provider = match self.provider(name) {
            Ok(provider) => provider,
            Err(OrchestratorError::Configuration { source, .. }) => {
                return Ok(ProviderDescription {
                    name: name.to_string(),
                    enabled: false,
                    capabilities: Capabilities::default(),
                    health: Health {
                        ok: false,
                        message: Some(source.to_string()),
                    },
                });
            }
            Err(e) => return Err(e),
        };

        let health = match self.bounded("healthcheck", name, provider.healthcheck()).await {
            Ok(Ok(())) => Health {
                ok: true,
                message: None,
            },
            Ok(Err(e)) => Health {
                ok: false,
                message: Some(e.to_string()),
            },
            Err(e) => Health {
                ok: false,
                message: Some(e.to_string()),
            },
        };

        Ok(ProviderDescription {
            name: name.to_string(),
            enabled: true,
            capabilities: provider.capabilities(),
            health,
        })
    }

    pub async fn create_preset(&self, preset: Preset) -> Result<Preset, OrchestratorError> {
        preset.validate()?;
        match self
            .bounded("get_preset", &preset.name, self.presets.get_preset(&preset.name))
            .await?
        {
            Ok(_) => return Err(OrchestratorError::PresetExists(preset.name)),
            Err(RepositoryError::PresetNotFound(_)) => {}
            Err(source) => return Err(storage_error(&preset.name, source)),
        }
        self.bounded("put_preset", &preset.name, self.presets.put_preset(&preset))
            .await?
            .map_err(|source| storage_error(&preset.name, source))?;
        info!(preset = %preset.name, "Preset created");
        Ok(preset)
    }

    pub async fn get_preset(&self, name: &str) -> Result<Preset, OrchestratorError> {
        self.bounded("get_preset", name, self.presets.get_preset(name))
            .await?
            .map_err(|e| preset_error(name, e))
    }

    pub async fn delete_preset(&self, name: &str) -> Result<(), OrchestratorError> {
        self.bounded("delete_preset", name, self.presets.delete_preset(name))
            .await?
            .map_err(|e| preset_error(name, e))?;
        info!(preset = name, "Preset deleted");
        Ok(())
    }

    pub async fn list_presets(&self) -> Result<Vec<Preset>, OrchestratorError> {
        self.bounded("list_presets", "presets", self.presets.list_presets())
            .await?
            .map_err(|source| storage_error("presets", source))
    }

    async fn describe_job(&self, job: &Job) -> Result<Status, OrchestratorError> {
        let provider = self.provider(&job.provider)?;
        let status = self
            .bounded("status", &job.id, provider.status(job))
            .await?
            .map_err(|source| OrchestratorError::Remote {
                operation: "status",
                job_id: job.id.clone(),
                source,
            })?;
        debug!(job_id = %job.id, state = %status.state, progress = status.progress, "Job described");
        Ok(merge(job, status))
    }

    async fn load(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        self.bounded("get", job_id, self.jobs.get_job(job_id))
            .await?
            .map_err(|e| match e {
                RepositoryError::JobNotFound(id) => OrchestratorError::JobNotFound(id),
                source => storage_error(job_id, source),
            })
    }

    /// Fill in named presets and validate every preset the job will use,
    /// including the ones sent inline.
    async fn resolve_presets(&self, job: &mut Job) -> Result<(), OrchestratorError> {
        for output in job.outputs.iter_mut() {
            let preset = match output.preset.take() {
                Some(preset) => preset,
                None => self.get_preset(&output.preset_name).await?,
            };
            preset.validate()?;
            output.preset = Some(preset);
        }
        Ok(())
    }

    /// Cached provider instance, built from the registry on first use.
    fn provider(&self, name: &str) -> Result<Arc<dyn Provider>, OrchestratorError> {
        if let Some(provider) = self
            .providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(provider.clone());
        }

        let factory = self.registry.factory(name).map_err(|e| match e {
            RegistryError::NotFound(name) | RegistryError::Duplicate(name) => {
                OrchestratorError::UnknownProvider(name)
            }
        })?;
        let provider = factory(&self.config.provider(name)).map_err(|source| {
            warn!(provider = name, error = %source, "Provider construction failed");
            OrchestratorError::Configuration {
                provider: name.to_string(),
                source,
            }
        })?;

        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        Ok(providers
            .entry(name.to_string())
            .or_insert(provider)
            .clone())
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        key: &str,
        fut: impl Future<Output = T>,
    ) -> Result<T, OrchestratorError> {
        tokio::time::timeout(self.config.call_timeout, fut)
            .await
            .map_err(|_| {
                warn!(operation, key, "Call timed out");
                OrchestratorError::Timeout {
                    operation,
                    key: key.to_string(),
                }
            })
    }
}

fn preset_error(name: &str, e: RepositoryError) -> OrchestratorError {
    match e {
        RepositoryError::PresetNotFound(name) => OrchestratorError::UnknownPreset(name),
        source => storage_error(name, source),
    }
}

fn storage_error(key: &str, source: RepositoryError) -> OrchestratorError {
    OrchestratorError::Storage {
        key: key.to_string(),
        provider_job_id: None,
        source,
    }
}

/// Persisted metadata wins over whatever the provider reports for identity.
fn merge(job: &Job, mut status: Status) -> Status {
    status.id = job.id.clone();
    status.labels = job.labels.clone();
    status.provider_name = job.provider.clone();
    if let Some(provider_job_id) = &job.provider_job_id {
        status.provider_job_id = provider_job_id.clone();
    }
    if status.output.destination.is_empty() {
        status.output.destination = job.output_destination.clone();
    }
    status
}
