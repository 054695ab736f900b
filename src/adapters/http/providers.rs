use super::error::ApiError;
use crate::application::orchestrator::{OrchestratorService, ProviderDescription};
use crate::ports::repository::{JobRepository, PresetRepository};
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

pub async fn list<J, P>(State(service): State<Arc<OrchestratorService<J, P>>>) -> Json<Vec<String>>
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    Json(service.providers())
}

pub async fn describe<J, P>(
    State(service): State<Arc<OrchestratorService<J, P>>>,
    Path(name): Path<String>,
) -> Result<Json<ProviderDescription>, ApiError>
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    Ok(Json(service.describe_provider(&name).await?))
}
