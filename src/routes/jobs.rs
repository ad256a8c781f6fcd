use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::{CallbackAck, CallbackPayload, UploadResponse};
use crate::models::job::JobRecord;
use crate::routes::error::ApiError;
use crate::services::lifecycle::Upload;

/// POST /api/upload: Upload an image and start a color variant job.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let declared_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Could not read image field: {e}")))?;

        // Sniff the payload instead of trusting the declared type
        let format = image::guess_format(&data).map_err(|_| {
            ApiError::UnsupportedMediaType("Uploaded file is not a supported image".to_string())
        })?;

        upload = Some(Upload {
            file_name,
            content_type: declared_type
                .filter(|t| t.starts_with("image/"))
                .unwrap_or_else(|| format.to_mime_type().to_string()),
            bytes: data.to_vec(),
        });
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("Missing `image` field".to_string()))?;
    let job_id = state.jobs.submit(upload).await?;

    Ok(Json(UploadResponse {
        job_id,
        success: true,
        message: "Image uploaded. Processing has started.".to_string(),
    }))
}

/// GET /api/status/{job_id}: Current job record.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobRecord>, ApiError> {
    let record = state.jobs.status(&job_id).await?;
    Ok(Json(record))
}

/// POST /api/callback/{job_id}: Result push from the inference service.
pub async fn receive_callback(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    payload: Result<Json<CallbackPayload>, JsonRejection>,
) -> Result<Json<CallbackAck>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::warn!(job_id = %job_id, error = %rejection.body_text(), "Rejected callback body");
        ApiError::Validation(rejection.body_text())
    })?;

    tracing::info!(job_id = %job_id, "Callback received");
    state.callbacks.ingest(&job_id, payload).await?;

    Ok(Json(CallbackAck {
        success: true,
        job_id,
    }))
}
