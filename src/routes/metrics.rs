use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus metrics scrape endpoint.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the job metrics.
pub fn describe() {
    metrics::describe_counter!("color_jobs_submitted_total", "Total jobs accepted at intake");
    metrics::describe_counter!(
        "color_jobs_completed_total",
        "Total jobs whose color sequence completed"
    );
    metrics::describe_counter!("color_jobs_failed_total", "Total jobs that failed upstream");
    metrics::describe_counter!("color_callbacks_total", "Total callbacks applied to jobs");
    metrics::describe_histogram!(
        "color_step_seconds",
        "Duration of a single color variant request"
    );
}
