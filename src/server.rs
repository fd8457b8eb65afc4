//! HTTP surface: submit/watch jobs and triage logs over a small axum API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cluster::KubeClusterClient;
use crate::config::Config;
use crate::detect::resolve_spec;
use crate::errors::ClusterError;
use crate::triage::{FailureAnalyzer, OpenAiAnalyzer, TriageVerdict};
use crate::watcher::{JobWatcher, RunResult, RunState};

/// Shared per-process state. Each request builds its own watcher run, so
/// concurrent runs share nothing mutable.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kube: kube::Client,
}

impl AppState {
    fn analyzer(&self) -> OpenAiAnalyzer {
        OpenAiAnalyzer::new(
            self.config.openai_api_key.clone(),
            self.config.openai_model.clone(),
        )
    }

    fn watcher(&self) -> JobWatcher<KubeClusterClient, OpenAiAnalyzer> {
        JobWatcher::new(
            KubeClusterClient::new(self.kube.clone()),
            self.analyzer(),
            self.config.watcher_settings(),
        )
    }
}

/// Request body for `POST /api/v1/jobs/run`.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub job_name: String,
    pub repo_url: Option<String>,
    /// Wait for the job to reach a terminal state. When false the endpoint
    /// returns right after submission with state `submitted`.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_wait() -> bool {
    true
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/v1/health", get(detailed_health))
        .route("/api/v1/jobs/run", post(run_job))
        .route("/api/v1/triage", post(triage_log))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Start the API server on the configured port.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let kube = kube::Client::try_default().await?;
    let port = config.http_port;
    let state = AppState {
        config: Arc::new(config),
        kube,
    };

    let addr = format!("0.0.0.0:{port}");
    info!(addr = %addr, "Starting AutoDev API server");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "autodev" }))
}

async fn detailed_health(State(state): State<AppState>) -> Json<Value> {
    let openai = if state.config.openai_api_key.is_some() {
        "configured"
    } else {
        "not_configured"
    };
    Json(json!({
        "status": "healthy",
        "services": {
            "api": "running",
            "openai": openai,
            "kubernetes": "unknown"
        }
    }))
}

async fn run_job(State(state): State<AppState>, Json(req): Json<RunRequest>) -> Response {
    let config = &state.config;

    let spec = match resolve_spec(
        &req.job_name,
        req.repo_url.as_deref(),
        &config.namespace,
        &config.default_image,
    )
    .await
    {
        Ok(spec) => spec,
        Err(err @ ClusterError::InvalidSpec { .. }) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": err.to_string() })),
            )
                .into_response();
        }
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": err.to_string() })),
            )
                .into_response();
        }
    };

    let watcher = state.watcher();

    let result = if req.wait {
        watcher.run(&spec).await
    } else {
        match watcher.submit(&spec).await {
            Ok(handle) => {
                info!(job = %handle.name, "Job submitted without waiting");
                RunResult {
                    job_name: handle.name,
                    namespace: handle.namespace,
                    state: RunState::Submitted,
                    logs: String::new(),
                    verdict: None,
                    error: None,
                }
            }
            Err(err) => RunResult {
                job_name: spec.name().to_string(),
                namespace: spec.namespace().to_string(),
                state: RunState::SubmitFailed,
                logs: String::new(),
                verdict: None,
                error: Some(err.to_string()),
            },
        }
    };

    let status = if result.state == RunState::SubmitFailed {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };

    (status, Json(result)).into_response()
}

/// Analyze raw log text posted as the request body.
async fn triage_log(State(state): State<AppState>, body: String) -> Json<TriageVerdict> {
    Json(state.analyzer().analyze(&body).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_request_wait_defaults_true() {
        let req: RunRequest = serde_json::from_str(r#"{ "job_name": "t1" }"#).unwrap();
        assert!(req.wait);
        assert!(req.repo_url.is_none());
    }

    #[test]
    fn test_run_request_explicit_fields() {
        let req: RunRequest = serde_json::from_str(
            r#"{ "job_name": "t1", "repo_url": "https://example.com/r.git", "wait": false }"#,
        )
        .unwrap();
        assert!(!req.wait);
        assert_eq!(req.repo_url.as_deref(), Some("https://example.com/r.git"));
    }
}
