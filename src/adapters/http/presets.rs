use super::error::ApiError;
use crate::application::orchestrator::OrchestratorService;
use crate::domain::Preset;
use crate::ports::repository::{JobRepository, PresetRepository};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

pub async fn create<J, P>(
    State(service): State<Arc<OrchestratorService<J, P>>>,
    Json(preset): Json<Preset>,
) -> Result<(StatusCode, Json<Preset>), ApiError>
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    let preset = service.create_preset(preset).await?;
    Ok((StatusCode::CREATED, Json(preset)))
}

pub async fn list<J, P>(
    State(service): State<Arc<OrchestratorService<J, P>>>,
) -> Result<Json<Vec<Preset>>, ApiError>
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    Ok(Json(service.list_presets().await?))
}

pub async fn get<J, P>(
    State(service): State<Arc<OrchestratorService<J, P>>>,
    Path(name): Path<String>,
) -> Result<Json<Preset>, ApiError>
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    Ok(Json(service.get_preset(&name).await?))
}

pub async fn delete<J, P>(
    State(service): State<Arc<OrchestratorService<J, P>>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError>
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    service.delete_preset(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
