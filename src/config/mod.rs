use serde::Deserialize;
use std::time::Duration;

use crate::models::job::JobMode;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// External inference endpoint that produces color variants
    pub inference_url: String,

    /// Externally reachable base URL of this service, used for callback URLs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Comma-separated list of allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,

    /// Directory where uploaded images are persisted
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Directory served under /results
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// Timeout for a single request to the inference service, in seconds
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: f64,

    /// How intake drives new jobs to completion
    #[serde(default)]
    pub job_mode: JobMode,

    /// Maximum accepted request body size
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_inference_timeout_secs() -> f64 {
    300.0
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Trimmed, non-empty entries of `CORS_ORIGINS`.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.inference_timeout_secs.max(0.0))
    }
}
