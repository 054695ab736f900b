//! JSON API over the orchestrator.

mod error;
pub mod jobs;
pub mod presets;
pub mod providers;

pub use error::ApiError;

use crate::application::orchestrator::OrchestratorService;
use crate::ports::repository::{JobRepository, PresetRepository};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn router<J, P>(service: Arc<OrchestratorService<J, P>>) -> Router
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    Router::new()
        .route("/jobs", post(jobs::submit::<J, P>))
        .route("/jobs/:id", get(jobs::describe::<J, P>))
        .route("/jobs/:id/cancel", post(jobs::cancel::<J, P>))
        .route("/providers", get(providers::list::<J, P>))
        .route("/providers/:name", get(providers::describe::<J, P>))
        .route(
            "/presets",
            post(presets::create::<J, P>).get(presets::list::<J, P>),
        )
        .route(
            "/presets/:name",
            get(presets::get::<J, P>).delete(presets::delete::<J, P>),
        )
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::application::registry::ProviderRegistry;
    use crate::config::{Config, ProviderSettings};
    use crate::domain::{Capabilities, Job, State, Status};
    use crate::ports::provider::{MockProvider, Provider, ProviderError};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn provider() -> MockProvider {
        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .returning(|_| Ok(Status::queued("mock", "remote-1")));
        provider.expect_status().returning(|job: &Job| {
            Ok(Status {
                state: State::Started,
                progress: 40.0,
                provider_job_id: job.provider_job_id.clone().unwrap_or_default(),
                ..Status::default()
            })
        });
        provider.expect_cancel().returning(|_| Ok(()));
        provider
            .expect_healthcheck()
            .returning(|| Err(ProviderError::Backend("unreachable".to_string())));
        provider.expect_capabilities().returning(|| Capabilities {
            input_formats: vec!["mp4".to_string()],
            ..Capabilities::default()
        });
        provider
    }

    fn app() -> Router {
        let provider: Arc<dyn Provider> = Arc::new(provider());
        let mut registry = ProviderRegistry::new();
        registry
            .register("mock", move |_: &ProviderSettings| Ok(provider.clone()))
            .unwrap();
        let store = MemoryStore::new(Duration::from_secs(60));
        let config = Config::from_vars(Vec::new()).unwrap();
        router(Arc::new(OrchestratorService::new(
            registry,
            config,
            store.clone(),
            store,
        )))
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn preset() -> Value {
        json!({
            "name": "720p",
            "container": "mp4",
            "video": {"codec": "h264", "height": 720, "bitrate": 2500000}
        })
    }

    fn submission(preset: &str) -> Value {
        json!({
            "provider": "mock",
            "labels": ["news"],
            "input": {"uri": "/media/in.mov"},
            "outputs": [{"file_name": "out.mp4", "preset_name": preset}]
        })
    }

    #[tokio::test]
    async fn test_submit_describe_cancel() {
        let app = app();
        let (status, _) = call(&app, request("POST", "/presets", Some(preset()))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, request("POST", "/jobs", Some(submission("720p")))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["provider_job_id"], "remote-1");
        let id = body["job_id"].as_str().unwrap().to_string();

        let (status, body) = call(&app, request("GET", &format!("/jobs/{}", id), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());
        assert_eq!(body["state"], "started");
        assert_eq!(body["labels"], json!(["news"]));
        assert_eq!(body["provider_name"], "mock");

        let (status, _) = call(&app, request("POST", &format!("/jobs/{}/cancel", id), None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app();

        let (status, body) = call(&app, request("GET", "/jobs/nope", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));

        let (status, _) = call(&app, request("POST", "/jobs", Some(submission("1080p")))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mut unknown = submission("720p");
        unknown["provider"] = json!("elsewhere");
        let (status, _) = call(&app, request("POST", "/jobs", Some(unknown))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mut empty = submission("720p");
        empty["outputs"] = json!([]);
        let (status, _) = call(&app, request("POST", "/jobs", Some(empty))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_preset_routes() {
        let app = app();
        call(&app, request("POST", "/presets", Some(preset()))).await;

        let (status, _) = call(&app, request("POST", "/presets", Some(preset()))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, request("GET", "/presets", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = call(&app, request("GET", "/presets/720p", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["video"]["codec"], "h264");

        let (status, _) = call(&app, request("DELETE", "/presets/720p", None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, request("GET", "/presets/720p", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_provider_routes() {
        let app = app();
        let (status, body) = call(&app, request("GET", "/providers", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["mock"]));

        let (status, body) = call(&app, request("GET", "/providers/mock", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], true);
        assert_eq!(body["health"]["ok"], false);
        assert_eq!(body["capabilities"]["input_formats"], json!(["mp4"]));

        let (status, _) = call(&app, request("GET", "/providers/other", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
