use garde::Validate;
use std::sync::Arc;

use crate::models::api::CallbackPayload;
use crate::models::job::{JobRecord, JobResult, JobStatus};
use crate::services::job_store::{JobError, JobStore};

/// Applies results pushed by the inference service directly to a job.
///
/// Unlike the pipeline, a callback is treated as a complete snapshot: its
/// `result` replaces whatever the job held instead of being merged.
pub struct CallbackIngester {
    store: Arc<JobStore>,
}

impl CallbackIngester {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Validate `payload` and write it into the job record.
    pub async fn ingest(
        &self,
        job_id: &str,
        payload: CallbackPayload,
    ) -> Result<JobRecord, CallbackError> {
        payload.validate()?;

        let record = self
            .store
            .update(job_id, |record| {
                if record.status.is_terminal() {
                    tracing::warn!(
                        job_id = %job_id,
                        status = %record.status,
                        "Callback received for finished job, overwriting"
                    );
                }
                apply(record, payload);
                record.clone()
            })
            .await?;

        metrics::counter!("color_callbacks_total").increment(1);
        tracing::info!(
            job_id = %job_id,
            status = %record.status,
            colors = record.color_count(),
            "Callback applied"
        );
        Ok(record)
    }
}

fn apply(record: &mut JobRecord, payload: CallbackPayload) {
    record.status = payload.status.unwrap_or(JobStatus::Completed);
    record.progress = 100;

    if let Some(message) = payload.message {
        record.message = message;
    }
    // A `result` key replaces the stored result, even when sent as null
    if let Some(result) = payload.result {
        record.result = result.map(JobResult::from);
    }

    // Any `error` key fails the job, null included
    match payload.error {
        Some(error) => {
            record.status = JobStatus::Failed;
            record.error = error;
        }
        None if record.status != JobStatus::Failed => record.error = None,
        None => {}
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Invalid callback payload: {0}")]
    Invalid(#[from] garde::Report),
}
