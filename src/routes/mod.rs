pub mod error;
pub mod health;
pub mod jobs;
pub mod metrics;

use axum::routing::{get, post};
use axum::Router;
use std::path::Path;
use tower_http::services::ServeDir;

use crate::app_state::AppState;

/// Job and health routes, without middleware layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::service_info))
        .route("/health", get(health::health_check))
        .route("/api/upload", post(jobs::upload_image))
        .route("/api/status/{job_id}", get(jobs::get_job_status))
        .route("/api/callback/{job_id}", post(jobs::receive_callback))
        .route("/api/test-inference", get(health::test_inference))
        .with_state(state)
}

/// Full route table: job routes plus generated images under `/results`.
pub fn app(state: AppState, results_dir: &Path) -> Router {
    router(state).nest_service("/results", ServeDir::new(results_dir))
}
