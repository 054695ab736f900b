use super::error::ApiError;
use crate::application::orchestrator::OrchestratorService;
use crate::domain::job::{ExecutionEnv, File, JobOutput, SidecarKind, StreamingParams};
use crate::domain::status::Opaque;
use crate::domain::{Job, Status};
use crate::ports::repository::{JobRepository, PresetRepository};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub provider: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub input: File,
    #[serde(default)]
    pub output_destination: String,
    pub outputs: Vec<JobOutput>,
    #[serde(default)]
    pub streaming: Option<StreamingParams>,
    #[serde(default)]
    pub features: Option<Opaque>,
    #[serde(default)]
    pub env: ExecutionEnv,
    #[serde(default)]
    pub sidecars: HashMap<SidecarKind, String>,
}

impl SubmitRequest {
    pub fn into_job(self) -> Job {
        let mut job = Job::new(self.provider, self.input, self.outputs);
        job.name = self.name;
        job.labels = self.labels;
        job.output_destination = self.output_destination;
        job.streaming = self.streaming;
        job.features = self.features;
        job.env = self.env;
        job.sidecars = self.sidecars;
        job
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub provider_job_id: String,
}

pub async fn submit<J, P>(
    State(service): State<Arc<OrchestratorService<J, P>>>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError>
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    let job = service.submit(request.into_job()).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            job_id: job.id,
            provider_job_id: job.provider_job_id.unwrap_or_default(),
        }),
    ))
}

pub async fn describe<J, P>(
    State(service): State<Arc<OrchestratorService<J, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Status>, ApiError>
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    Ok(Json(service.describe(&id).await?))
}

pub async fn cancel<J, P>(
    State(service): State<Arc<OrchestratorService<J, P>>>,
    Path(id): Path<String>,
) -> Result<Json<Status>, ApiError>
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    Ok(Json(service.cancel(&id).await?))
}
