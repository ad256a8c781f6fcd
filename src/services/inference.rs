use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::job::ColorKey;

/// Longest slice of an upstream body kept in logs and error messages.
const BODY_PREVIEW_CHARS: usize = 500;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the external inference service that renders color variants.
pub struct InferenceClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

/// A single color variant returned by the inference service.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorVariant {
    pub color: ColorKey,
    pub url: String,
    pub input_image_url: Option<String>,
}

/// Outcome of a connectivity probe against the inference service.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub url: String,
    pub status: u16,
    pub body: serde_json::Value,
}

#[derive(Deserialize)]
struct InferenceResponse {
    result: InferenceResult,
}

#[derive(Deserialize)]
struct InferenceResult {
    #[serde(default)]
    images: HashMap<String, Option<String>>,
    image_url: Option<String>,
    input_image_url: Option<String>,
}

impl InferenceClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "ngrok-skip-browser-warning",
            HeaderValue::from_static("true"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("color-variants/", env!("CARGO_PKG_VERSION"))),
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::Transport)?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the inference service for one color variant of `image`.
    pub async fn request_color(
        &self,
        job_id: &str,
        color: ColorKey,
        image: ImagePart<'_>,
    ) -> Result<ColorVariant, UpstreamError> {
        let form = image
            .into_form()?
            .text("job_id", job_id.to_string())
            .text("color", color.to_string());

        let body = self.post(job_id, form).await?;
        parse_color_variant(&body, color)
    }

    /// Hand the whole job to the inference service, which reports back
    /// through `callback_url` instead of in the response body.
    pub async fn dispatch_with_callback(
        &self,
        job_id: &str,
        callback_url: &str,
        image: ImagePart<'_>,
    ) -> Result<(), UpstreamError> {
        let form = image
            .into_form()?
            .text("job_id", job_id.to_string())
            .text("callback_url", callback_url.to_string());

        self.post(job_id, form).await.map(|_| ())
    }

    /// GET the service's health endpoint, derived from the inference URL.
    pub async fn probe(&self) -> Result<ProbeOutcome, UpstreamError> {
        let url = health_url(&self.endpoint);
        tracing::info!(url = %url, "Probing inference service");

        let response = self
            .http
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| classify(e, PROBE_TIMEOUT))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify(e, PROBE_TIMEOUT))?;
        let body = if status == StatusCode::OK {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        } else {
            serde_json::Value::String(text)
        };

        Ok(ProbeOutcome {
            url,
            status: status.as_u16(),
            body,
        })
    }

    /// POST a multipart form and return the body of a 200 response.
    async fn post(&self, job_id: &str, form: Form) -> Result<String, UpstreamError> {
        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify(e, self.timeout))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify(e, self.timeout))?;

        tracing::debug!(
            job_id = %job_id,
            status = status.as_u16(),
            body = %preview(&body),
            "Inference response received"
        );

        if status != StatusCode::OK {
            return Err(UpstreamError::UnexpectedStatus {
                status: status.as_u16(),
                body: preview(&body),
            });
        }
        Ok(body)
    }
}

/// Borrowed image bytes plus the metadata sent with them.
#[derive(Debug, Clone, Copy)]
pub struct ImagePart<'a> {
    pub bytes: &'a [u8],
    pub file_name: &'a str,
    pub content_type: &'a str,
}

impl ImagePart<'_> {
    fn into_form(self) -> Result<Form, UpstreamError> {
        let part = Part::bytes(self.bytes.to_vec())
            .file_name(self.file_name.to_string())
            .mime_str(self.content_type)
            .map_err(UpstreamError::Transport)?;
        Ok(Form::new().part("image", part))
    }
}

/// Extract the URL for `color` from an inference response body.
///
/// A per-color entry under `result.images` wins over `result.image_url`.
pub fn parse_color_variant(body: &str, color: ColorKey) -> Result<ColorVariant, UpstreamError> {
    let parsed: InferenceResponse = serde_json::from_str(body).map_err(|e| {
        UpstreamError::MalformedResponse(format!("expected a JSON object with `result`: {e}"))
    })?;
    let mut result = parsed.result;

    let url = result
        .images
        .remove(color.to_string().as_str())
        .flatten()
        .or(result.image_url)
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| {
            UpstreamError::MalformedResponse(format!(
                "no URL for color {color} in `result.images` or `result.image_url`"
            ))
        })?;

    Ok(ColorVariant {
        color,
        url,
        input_image_url: result.input_image_url.filter(|u| !u.trim().is_empty()),
    })
}

fn health_url(endpoint: &str) -> String {
    match endpoint.trim_end_matches('/').strip_suffix("/process") {
        Some(base) => format!("{base}/health"),
        None => format!("{}/health", endpoint.trim_end_matches('/')),
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

fn classify(err: reqwest::Error, timeout: Duration) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout(timeout)
    } else if err.is_connect() {
        UpstreamError::Connection(err)
    } else {
        UpstreamError::Transport(err)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Inference service returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),

    #[error("Inference service did not respond within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Could not connect to inference service: {0}")]
    Connection(reqwest::Error),

    #[error("Inference request failed: {0}")]
    Transport(reqwest::Error),
}

impl UpstreamError {
    /// Short, user-facing description of the failure class.
    pub fn summary(&self) -> &'static str {
        match self {
            UpstreamError::UnexpectedStatus { .. } | UpstreamError::MalformedResponse(_) => {
                "The inference service returned an unusable response."
            }
            UpstreamError::Timeout(_) => "The inference service timed out.",
            UpstreamError::Connection(_) => {
                "Could not reach the inference service. Check the configured URL."
            }
            UpstreamError::Transport(_) => "The request to the inference service failed.",
        }
    }
}
