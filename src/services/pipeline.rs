use std::sync::Arc;
use std::time::Instant;
use strum::EnumCount;

use crate::models::job::{ColorKey, JobRecord, JobResult, JobStatus};
use crate::services::inference::{ColorVariant, ImagePart, InferenceClient, UpstreamError};
use crate::services::job_store::{JobError, JobStore};
use crate::services::storage::{StorageError, StoredUpload, UploadStorage};

/// Progress reported once the first request is on its way.
pub const PROGRESS_REQUEST_SENT: u8 = 10;
/// Progress contributed by each finished color.
pub const PROGRESS_PER_COLOR: u8 = 10;
/// Progress reported after the last color, before the job is marked complete.
pub const PROGRESS_FINALIZING: u8 = 90;

/// Progress after `steps_completed` colors have been merged.
pub fn progress_after(steps_completed: usize) -> u8 {
    let steps = steps_completed.min(ColorKey::COUNT) as u8;
    PROGRESS_REQUEST_SENT + PROGRESS_PER_COLOR * steps
}

/// Walks the fixed color sequence for one job, one upstream call at a time,
/// writing partial results back to the job store after every step.
pub struct ColorSequencePipeline {
    store: Arc<JobStore>,
    storage: Arc<UploadStorage>,
    inference: Arc<InferenceClient>,
}

#[derive(Debug, thiserror::Error)]
enum PipelineError {
    #[error("Could not read uploaded image: {0}")]
    Storage(#[from] StorageError),

    #[error("{color} variant failed: {source}")]
    Step {
        color: ColorKey,
        #[source]
        source: UpstreamError,
    },

    #[error(transparent)]
    Job(#[from] JobError),

    /// The record reached a terminal state through another writer.
    #[error("job already finished")]
    Superseded,
}

impl ColorSequencePipeline {
    pub fn new(
        store: Arc<JobStore>,
        storage: Arc<UploadStorage>,
        inference: Arc<InferenceClient>,
    ) -> Self {
        Self {
            store,
            storage,
            inference,
        }
    }

    /// Run the whole sequence for `job_id`. Failures are recorded on the job,
    /// never returned.
    pub async fn run(&self, job_id: &str, upload: &StoredUpload) {
        let started = Instant::now();
        tracing::info!(job_id = %job_id, "Color sequence started");

        match self.run_steps(job_id, upload).await {
            Ok(()) => {
                metrics::counter!("color_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Color sequence completed"
                );
            }
            Err(PipelineError::Superseded) => {
                tracing::warn!(
                    job_id = %job_id,
                    "Job finished by another writer, stopping color sequence"
                );
            }
            Err(PipelineError::Job(e)) => {
                tracing::error!(job_id = %job_id, error = %e, "Job record unavailable");
            }
            Err(e) => self.record_failure(job_id, &e).await,
        }
    }

    async fn run_steps(&self, job_id: &str, upload: &StoredUpload) -> Result<(), PipelineError> {
        let bytes = self.storage.load(upload).await?;
        let image = ImagePart {
            bytes: &bytes,
            file_name: &upload.file_name,
            content_type: &upload.content_type,
        };

        for (index, color) in ColorKey::sequence().enumerate() {
            let step = index + 1;
            self.advance(job_id, |record| {
                record.status = JobStatus::Processing;
                record.progress = record.progress.max(progress_after(index));
                record.message = format!(
                    "Requesting the {color} variant ({step}/{})...",
                    ColorKey::COUNT
                );
            })
            .await?;

            tracing::info!(job_id = %job_id, color = %color, step, "Requesting color variant");
            let step_started = Instant::now();
            let variant = self
                .inference
                .request_color(job_id, color, image)
                .await
                .map_err(|source| PipelineError::Step { color, source })?;
            metrics::histogram!("color_step_seconds").record(step_started.elapsed().as_secs_f64());

            tracing::info!(job_id = %job_id, color = %color, url = %variant.url, "Color variant received");
            self.advance(job_id, |record| merge_variant(record, variant, step))
                .await?;
        }

        self.advance(job_id, |record| {
            record.progress = PROGRESS_FINALIZING;
            record.message = "Finalizing results...".to_string();
        })
        .await?;

        self.advance(job_id, |record| {
            record.status = JobStatus::Completed;
            record.progress = 100;
            record.message = "All color variants are ready.".to_string();
        })
        .await
    }

    /// Apply `mutate` unless the job is already terminal.
    async fn advance<F>(&self, job_id: &str, mutate: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let applied = self
            .store
            .update(job_id, |record| {
                if record.status.is_terminal() {
                    return false;
                }
                mutate(record);
                true
            })
            .await?;

        if applied {
            Ok(())
        } else {
            Err(PipelineError::Superseded)
        }
    }

    async fn record_failure(&self, job_id: &str, err: &PipelineError) {
        metrics::counter!("color_jobs_failed_total").increment(1);
        tracing::error!(job_id = %job_id, error = %err, "Color sequence failed");

        let message = match err {
            PipelineError::Step { color, source } => {
                format!("Generating the {color} variant failed. {}", source.summary())
            }
            _ => "Processing failed before any color was requested.".to_string(),
        };
        let error = err.to_string();

        let written = self
            .store
            .update(job_id, |record| {
                if !record.status.is_terminal() {
                    record.fail(message, error);
                }
            })
            .await;
        if let Err(e) = written {
            tracing::error!(job_id = %job_id, error = %e, "Could not record job failure");
        }
    }
}

/// Add one color to the job's result without touching earlier colors.
/// The input image URL is only captured from the first step.
fn merge_variant(record: &mut JobRecord, variant: ColorVariant, step: usize) {
    let result = record.result.get_or_insert_with(JobResult::default);
    result.images.insert(variant.color, variant.url);
    if step == 1 {
        if let Some(input) = variant.input_image_url {
            result.input_image_url = Some(input);
        }
    }

    record.progress = record.progress.max(progress_after(step));
    record.message = format!(
        "Received the {} variant ({step}/{}).",
        variant.color,
        ColorKey::COUNT
    );
}
