use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::job::{JobMode, JobRecord, JobStatus};
use crate::services::inference::{ImagePart, InferenceClient};
use crate::services::job_store::{JobError, JobStore};
use crate::services::pipeline::ColorSequencePipeline;
use crate::services::storage::{StorageError, StoredUpload, UploadStorage};

/// Progress shown while a dispatched job waits for its callback.
const PROGRESS_DISPATCHED: u8 = 30;

/// An image accepted at intake.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Creates jobs, launches their background work, and serves status reads.
pub struct JobLifecycleController {
    store: Arc<JobStore>,
    storage: Arc<UploadStorage>,
    inference: Arc<InferenceClient>,
    pipeline: Arc<ColorSequencePipeline>,
    mode: JobMode,
    callback_base_url: String,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl JobLifecycleController {
    pub fn new(
        store: Arc<JobStore>,
        storage: Arc<UploadStorage>,
        inference: Arc<InferenceClient>,
        mode: JobMode,
        callback_base_url: impl Into<String>,
    ) -> Self {
        let pipeline = Arc::new(ColorSequencePipeline::new(
            store.clone(),
            storage.clone(),
            inference.clone(),
        ));

        Self {
            store,
            storage,
            inference,
            pipeline,
            mode,
            callback_base_url: callback_base_url.into(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> JobMode {
        self.mode
    }

    /// Persist the upload, create a `pending` job, and schedule its
    /// background task. Returns as soon as the task is scheduled.
    pub async fn submit(&self, upload: Upload) -> Result<String, IntakeError> {
        let job_id = Uuid::new_v4().to_string();

        let stored = self
            .storage
            .save(&job_id, &upload.file_name, &upload.content_type, &upload.bytes)
            .await?;
        self.store.create(&job_id, self.mode).await?;

        metrics::counter!("color_jobs_submitted_total").increment(1);
        tracing::info!(
            job_id = %job_id,
            mode = %self.mode,
            size = upload.bytes.len(),
            "Job created"
        );

        let handle = match self.mode {
            JobMode::Pipeline => {
                let pipeline = self.pipeline.clone();
                let id = job_id.clone();
                tokio::spawn(async move { pipeline.run(&id, &stored).await })
            }
            JobMode::Callback => {
                let dispatch = Dispatch {
                    store: self.store.clone(),
                    storage: self.storage.clone(),
                    inference: self.inference.clone(),
                    callback_url: self.callback_url(&job_id),
                };
                let id = job_id.clone();
                tokio::spawn(async move { dispatch.run(&id, &stored).await })
            }
        };

        {
            let mut tasks = self.tasks();
            tasks.retain(|_, handle| !handle.is_finished());
            tasks.insert(job_id.clone(), handle);
        }

        Ok(job_id)
    }

    /// Endpoint the inference service should push results for `job_id` to.
    pub fn callback_url(&self, job_id: &str) -> String {
        format!(
            "{}/api/callback/{}",
            self.callback_base_url.trim_end_matches('/'),
            job_id
        )
    }

    /// Current snapshot of a job.
    pub async fn status(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.store.get(job_id).await
    }

    /// Number of background tasks still running.
    pub fn active_jobs(&self) -> usize {
        self.tasks()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Wait for a job's background task to finish. Finished handles are
    /// pruned on submit, so a known job without a handle is already done.
    /// Returns `false` if `job_id` is unknown.
    pub async fn wait_for(&self, job_id: &str) -> bool {
        let handle = self.tasks().remove(job_id);
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    tracing::error!(job_id = %job_id, error = %e, "Job task panicked");
                }
                true
            }
            None => self.store.get(job_id).await.is_ok(),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Single upstream hand-off for jobs completed through callbacks.
struct Dispatch {
    store: Arc<JobStore>,
    storage: Arc<UploadStorage>,
    inference: Arc<InferenceClient>,
    callback_url: String,
}

impl Dispatch {
    async fn run(&self, job_id: &str, upload: &StoredUpload) {
        let started = self
            .store
            .update(job_id, |record| {
                if record.status.is_terminal() {
                    return false;
                }
                record.status = JobStatus::Processing;
                record.progress = record.progress.max(PROGRESS_DISPATCHED);
                record.message = "Sending image to the inference service...".to_string();
                true
            })
            .await;
        if !matches!(started, Ok(true)) {
            return;
        }

        tracing::info!(job_id = %job_id, callback_url = %self.callback_url, "Dispatching job");
        let outcome = match self.storage.load(upload).await {
            Ok(bytes) => {
                let image = ImagePart {
                    bytes: &bytes,
                    file_name: &upload.file_name,
                    content_type: &upload.content_type,
                };
                self.inference
                    .dispatch_with_callback(job_id, &self.callback_url, image)
                    .await
                    .map_err(|e| (e.summary().to_string(), e.to_string()))
            }
            Err(e) => Err((
                "Could not read the uploaded image.".to_string(),
                e.to_string(),
            )),
        };

        let written = self
            .store
            .update(job_id, |record| {
                if record.status.is_terminal() {
                    return;
                }
                match outcome {
                    Ok(()) => {
                        record.message =
                            "Image accepted, waiting for the inference callback.".to_string()
                    }
                    Err((message, error)) => {
                        metrics::counter!("color_jobs_failed_total").increment(1);
                        tracing::error!(job_id = %job_id, error = %error, "Dispatch failed");
                        record.fail(message, error);
                    }
                }
            })
            .await;
        if let Err(e) = written {
            tracing::error!(job_id = %job_id, error = %e, "Could not record dispatch outcome");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Failed to persist upload: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Job(#[from] JobError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn controller(dir: &std::path::Path) -> JobLifecycleController {
        let inference =
            InferenceClient::new("http://127.0.0.1:9/process", Duration::from_secs(1)).unwrap();
        JobLifecycleController::new(
            Arc::new(JobStore::new()),
            Arc::new(UploadStorage::new(dir)),
            Arc::new(inference),
            JobMode::Callback,
            "https://api.example.com/",
        )
    }

    #[test]
    fn test_callback_url() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        assert_eq!(
            controller.callback_url("abc"),
            "https://api.example.com/api/callback/abc"
        );
    }

    #[tokio::test]
    async fn test_status_of_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());

        assert!(matches!(
            controller.status("nope").await,
            Err(JobError::NotFound(_))
        ));
        assert!(!controller.wait_for("nope").await);
        assert_eq!(controller.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_finished_tasks_are_pruned_on_submit() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        let upload = Upload {
            file_name: "photo.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        };

        let first = controller.submit(upload.clone()).await.unwrap();
        for _ in 0..300 {
            if controller.active_jobs() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(controller.active_jobs(), 0);

        let second = controller.submit(upload).await.unwrap();
        {
            let tasks = controller.tasks();
            assert_eq!(tasks.len(), 1);
            assert!(tasks.contains_key(&second));
        }

        // The pruned job is still known and already finished
        assert!(controller.wait_for(&first).await);
        assert!(controller.wait_for(&second).await);
        assert_eq!(
            controller.status(&first).await.unwrap().status,
            JobStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_invalid_file_name_creates_no_job() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());

        let err = controller
            .submit(Upload {
                file_name: "..".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::Storage(_)));
        assert!(controller.store.is_empty().await);
    }
}
