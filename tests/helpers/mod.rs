//! Test helper utilities: a fake inference service and job harness

#![allow(dead_code)]

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use color_variants::models::job::{ColorKey, JobMode, JobRecord};
use color_variants::services::inference::InferenceClient;
use color_variants::services::job_store::JobStore;
use color_variants::services::lifecycle::{JobLifecycleController, Upload};
use color_variants::services::storage::UploadStorage;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use crate::fixtures;

/// How the fake inference service misbehaves for one color.
#[derive(Debug, Clone)]
pub enum Failure {
    Status(u16),
    Malformed,
    Hang(Duration),
}

#[derive(Debug, Clone, Default)]
pub struct Behavior {
    pub fail_on: Option<(ColorKey, Failure)>,
    /// Answer with `result.image_url` instead of `result.images`.
    pub single_url: bool,
    /// Status returned to callback-mode dispatches.
    pub dispatch_status: Option<u16>,
}

/// One request seen by the fake inference service.
#[derive(Debug, Clone)]
pub struct Call {
    pub job_id: String,
    pub color: Option<String>,
    pub callback_url: Option<String>,
    pub image_len: usize,
    /// Job progress and number of recorded colors at the time of the call.
    pub observed: Option<(u8, usize)>,
}

#[derive(Clone)]
struct FakeState {
    base_url: String,
    behavior: Behavior,
    store: Arc<JobStore>,
    calls: Arc<Mutex<Vec<Call>>>,
}

/// An inference service stand-in listening on a local port.
pub struct FakeInference {
    pub url: String,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeInference {
    pub async fn start(behavior: Behavior, store: Arc<JobStore>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let state = FakeState {
            base_url: base_url.clone(),
            behavior,
            store,
            calls: calls.clone(),
        };
        let app = Router::new()
            .route("/process", post(handle))
            .route("/health", axum::routing::get(|| async { Json(json!({"status": "ok"})) }))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("{base_url}/process"),
            calls,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn colors_requested(&self) -> Vec<String> {
        self.calls().into_iter().filter_map(|c| c.color).collect()
    }
}

async fn handle(State(state): State<FakeState>, mut multipart: Multipart) -> Response {
    let mut call = Call {
        job_id: String::new(),
        color: None,
        callback_url: None,
        image_len: 0,
        observed: None,
    };

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => call.image_len = field.bytes().await.unwrap().len(),
            "job_id" => call.job_id = field.text().await.unwrap(),
            "color" => call.color = Some(field.text().await.unwrap()),
            "callback_url" => call.callback_url = Some(field.text().await.unwrap()),
            _ => {}
        }
    }

    call.observed = state
        .store
        .get(&call.job_id)
        .await
        .ok()
        .map(|r| (r.progress, r.color_count()));
    state.calls.lock().unwrap().push(call.clone());

    if call.callback_url.is_some() {
        let status = state.behavior.dispatch_status.unwrap_or(200);
        return (
            StatusCode::from_u16(status).unwrap(),
            Json(json!({"accepted": true})),
        )
            .into_response();
    }

    let color = call.color.clone().unwrap_or_default();
    if let Some((fail_color, failure)) = &state.behavior.fail_on {
        if fail_color.to_string() == color {
            match failure {
                Failure::Status(code) => {
                    return (StatusCode::from_u16(*code).unwrap(), "upstream exploded")
                        .into_response()
                }
                Failure::Malformed => return Json(json!({"status": "ok"})).into_response(),
                Failure::Hang(delay) => tokio::time::sleep(*delay).await,
            }
        }
    }

    let url = format!("{}/results/{}/{}.png", state.base_url, call.job_id, color);
    let input = format!("{}/input/{}-{}.png", state.base_url, call.job_id, color);
    let body = if state.behavior.single_url {
        json!({"result": {"image_url": url}})
    } else {
        json!({"result": {"images": {color: url}, "input_image_url": input}})
    };
    Json(body).into_response()
}

/// A controller wired to a fake inference service.
pub struct Harness {
    pub store: Arc<JobStore>,
    pub controller: JobLifecycleController,
    pub upstream: FakeInference,
    _dir: TempDir,
}

impl Harness {
    pub async fn start(behavior: Behavior, mode: JobMode) -> Self {
        Self::with_timeout(behavior, mode, Duration::from_secs(10)).await
    }

    pub async fn with_timeout(behavior: Behavior, mode: JobMode, timeout: Duration) -> Self {
        let store = Arc::new(JobStore::new());
        let upstream = FakeInference::start(behavior, store.clone()).await;
        let inference = InferenceClient::new(&upstream.url, timeout).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(store.clone(), inference, mode, dir.path());

        Self {
            store,
            controller,
            upstream,
            _dir: dir,
        }
    }

    pub async fn submit_png(&self) -> String {
        self.controller.submit(png_upload()).await.unwrap()
    }

    /// Submit, wait for the background task, and return the final record.
    pub async fn run_to_end(&self) -> JobRecord {
        let job_id = self.submit_png().await;
        assert!(self.controller.wait_for(&job_id).await);
        self.controller.status(&job_id).await.unwrap()
    }
}

/// Controller storing uploads under `upload_dir`.
pub fn controller(
    store: Arc<JobStore>,
    inference: InferenceClient,
    mode: JobMode,
    upload_dir: &Path,
) -> JobLifecycleController {
    JobLifecycleController::new(
        store,
        Arc::new(UploadStorage::new(upload_dir)),
        Arc::new(inference),
        mode,
        "http://color-variants.test",
    )
}

pub fn png_upload() -> Upload {
    Upload {
        file_name: "photo.png".to_string(),
        content_type: "image/png".to_string(),
        bytes: fixtures::small_png(),
    }
}

/// Address with nothing listening on it.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/process")
}
