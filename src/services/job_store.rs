use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use crate::models::job::{JobMode, JobRecord};

/// In-memory, process-lifetime store of job records.
///
/// Every read returns a snapshot clone, so pollers may observe any
/// previously committed partial state. Writers apply a mutation under the
/// write lock, which is held only for the duration of the closure.
///
/// Every committed write is also published as a snapshot to subscribers.
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
    changes: broadcast::Sender<JobRecord>,
}

/// Buffered snapshots per subscriber before it starts lagging.
const CHANGE_CAPACITY: usize = 256;

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Receive a snapshot of every record after each create or update.
    pub fn subscribe(&self) -> broadcast::Receiver<JobRecord> {
        self.changes.subscribe()
    }

    /// Insert a fresh `pending` record. Fails if the id is already taken.
    pub async fn create(&self, job_id: &str, mode: JobMode) -> Result<JobRecord, JobError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return Err(JobError::AlreadyExists(job_id.to_string()));
        }

        let record = JobRecord::new(job_id, mode);
        jobs.insert(job_id.to_string(), record.clone());
        // No subscribers is not an error
        let _ = self.changes.send(record.clone());
        Ok(record)
    }

    /// Snapshot of a job record.
    pub async fn get(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Apply `mutate` to a record atomically and refresh `updated_at`.
    pub async fn update<F, R>(&self, job_id: &str, mutate: F) -> Result<R, JobError>
    where
        F: FnOnce(&mut JobRecord) -> R,
    {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let out = mutate(record);
        record.updated_at = Utc::now();
        let _ = self.changes.send(record.clone());
        Ok(out)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),
}
