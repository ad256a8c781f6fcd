use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    pub message: String,
    pub inference_url: String,
    pub cors_origins: Vec<String>,
    pub timeout_secs: f64,
    pub job_mode: String,
    pub active_jobs: usize,
}

#[derive(Serialize)]
pub struct InferenceProbe {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /: Service configuration summary.
pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "color-variants is running".to_string(),
        inference_url: state.inference.endpoint().to_string(),
        cors_origins: state.cors_origins.as_ref().clone(),
        timeout_secs: state.inference.timeout().as_secs_f64(),
        job_mode: state.jobs.mode().to_string(),
        active_jobs: state.jobs.active_jobs(),
    })
}

/// GET /health: Liveness check.
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// GET /api/test-inference: Reachability check against the inference service.
pub async fn test_inference(State(state): State<AppState>) -> Json<InferenceProbe> {
    match state.inference.probe().await {
        Ok(outcome) => Json(InferenceProbe {
            success: true,
            url: Some(outcome.url),
            status_code: Some(outcome.status),
            response: Some(outcome.body),
            error: None,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Inference probe failed");
            Json(InferenceProbe {
                success: false,
                url: None,
                status_code: None,
                response: None,
                error: Some(e.to_string()),
            })
        }
    }
}
