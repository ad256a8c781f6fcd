use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::Path;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use color_variants::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{inference::InferenceClient, job_store::JobStore, storage::UploadStorage},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration; INFERENCE_URL must be set");
            std::process::exit(1);
        }
    };

    tracing::info!(
        inference_url = %config.inference_url,
        public_base_url = %config.public_base_url,
        cors_origins = %config.cors_origins,
        upload_dir = %config.upload_dir,
        results_dir = %config.results_dir,
        timeout_secs = config.inference_timeout_secs,
        job_mode = %config.job_mode,
        "Configuration loaded"
    );

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    // Prepare upload and result directories
    let storage = UploadStorage::new(&config.upload_dir);
    storage
        .ensure_dir()
        .await
        .expect("Failed to create upload directory");
    tokio::fs::create_dir_all(&config.results_dir)
        .await
        .expect("Failed to create results directory");

    let inference = InferenceClient::new(&config.inference_url, config.inference_timeout())
        .expect("Failed to initialize inference client");

    let cors_origins = config.cors_origin_list();
    let state = AppState::new(
        JobStore::new(),
        storage,
        inference,
        config.job_mode,
        &config.public_base_url,
        cors_origins.clone(),
    );

    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let app = routes::app(state, Path::new(&config.results_dir))
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    tracing::info!("Starting color-variants on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
