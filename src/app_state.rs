use std::sync::Arc;

use crate::models::job::JobMode;
use crate::services::{
    callback::CallbackIngester,
    inference::InferenceClient,
    job_store::JobStore,
    lifecycle::JobLifecycleController,
    storage::UploadStorage,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobLifecycleController>,
    pub callbacks: Arc<CallbackIngester>,
    pub inference: Arc<InferenceClient>,
    pub cors_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(
        store: JobStore,
        storage: UploadStorage,
        inference: InferenceClient,
        mode: JobMode,
        public_base_url: &str,
        cors_origins: Vec<String>,
    ) -> Self {
        let store = Arc::new(store);
        let inference = Arc::new(inference);
        let jobs = JobLifecycleController::new(
            store.clone(),
            Arc::new(storage),
            inference.clone(),
            mode,
            public_base_url,
        );

        Self {
            jobs: Arc::new(jobs),
            callbacks: Arc::new(CallbackIngester::new(store)),
            inference,
            cors_origins: Arc::new(cors_origins),
        }
    }
}
