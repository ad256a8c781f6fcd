use garde::Validate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::models::job::{ColorKey, JobResult, JobStatus};

/// Response after submitting an image.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: String,
    pub success: bool,
    pub message: String,
}

/// Push notification from the inference service.
///
/// `result` and `error` keep key presence apart from value: `None` means the
/// key was absent, `Some(None)` means it was sent as `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CallbackPayload {
    #[garde(skip)]
    pub status: Option<JobStatus>,

    #[garde(length(max = 2000))]
    pub message: Option<String>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[garde(custom(valid_result))]
    pub result: Option<Option<CallbackResult>>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[garde(custom(error_within_limit))]
    pub error: Option<Option<String>>,
}

const MAX_ERROR_LEN: usize = 4000;

/// Wraps a field that appeared in the body, `null` included.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn valid_result(result: &Option<Option<CallbackResult>>, _ctx: &()) -> garde::Result {
    match result {
        Some(Some(result)) => result
            .validate()
            .map_err(|report| garde::Error::new(report.to_string())),
        _ => Ok(()),
    }
}

fn error_within_limit(error: &Option<Option<String>>, _ctx: &()) -> garde::Result {
    match error {
        Some(Some(error)) if error.chars().count() > MAX_ERROR_LEN => Err(garde::Error::new(
            format!("length is greater than {MAX_ERROR_LEN}"),
        )),
        _ => Ok(()),
    }
}

/// Result snapshot carried by a callback; replaces whatever the job held.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CallbackResult {
    #[serde(default)]
    #[garde(custom(non_empty_urls))]
    pub images: BTreeMap<ColorKey, String>,

    #[garde(length(min = 1))]
    pub input_image_url: Option<String>,
}

fn non_empty_urls(images: &BTreeMap<ColorKey, String>, _ctx: &()) -> garde::Result {
    match images.iter().find(|(_, url)| url.trim().is_empty()) {
        Some((color, _)) => Err(garde::Error::new(format!("empty URL for color {color}"))),
        None => Ok(()),
    }
}

impl From<CallbackResult> for JobResult {
    fn from(result: CallbackResult) -> Self {
        JobResult {
            images: result.images,
            input_image_url: result.input_image_url,
        }
    }
}

/// Acknowledgement returned to the callback sender.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackAck {
    pub success: bool,
    pub job_id: String,
}
