use crate::application::orchestrator::OrchestratorError;
use crate::ports::provider::ProviderError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Orchestrator failure rendered as `{"error": ...}` with a matching status.
pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            OrchestratorError::UnknownProvider(_)
            | OrchestratorError::JobNotFound(_)
            | OrchestratorError::UnknownPreset(_) => StatusCode::NOT_FOUND,
            OrchestratorError::PresetExists(_) | OrchestratorError::NotSubmitted(_) => {
                StatusCode::CONFLICT
            }
            OrchestratorError::InvalidJob(_) | OrchestratorError::InvalidPreset(_) => {
                StatusCode::BAD_REQUEST
            }
            OrchestratorError::Remote { source, .. } => match source {
                ProviderError::Unsupported(_)
                | ProviderError::Downmix(_)
                | ProviderError::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            },
            OrchestratorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            OrchestratorError::Configuration { .. } | OrchestratorError::Storage { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self.0);
        }
        let body = match &self.0 {
            OrchestratorError::Storage {
                provider_job_id: Some(provider_job_id),
                ..
            } => json!({ "error": self.0.to_string(), "provider_job_id": provider_job_id }),
            _ => json!({ "error": self.0.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
