use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator};

/// Status of a color variant job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs receive no further background writes.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// How a job is driven to completion, fixed when the job is created.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobMode {
    /// The service walks the color sequence itself, one upstream call per color.
    #[default]
    Pipeline,
    /// The image is dispatched once and the upstream pushes results back.
    Callback,
}

/// The fixed set of color variants, in pipeline order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ColorKey {
    White,
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
}

impl ColorKey {
    /// All colors in the order the pipeline requests them.
    pub fn sequence() -> impl Iterator<Item = ColorKey> {
        ColorKey::iter()
    }
}

/// Aggregated output of a job. Partially populated while the job runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub images: BTreeMap<ColorKey, String>,
    pub input_image_url: Option<String>,
}

/// A color variant job as exposed to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub mode: JobMode,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(job_id: impl Into<String>, mode: JobMode) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            mode,
            status: JobStatus::Pending,
            progress: 0,
            message: "Job is waiting to be processed.".to_string(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the record to `failed`, keeping progress and partial results.
    pub fn fail(&mut self, message: impl Into<String>, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.message = message.into();
        self.error = Some(error.into());
    }

    /// Number of colors recorded so far.
    pub fn color_count(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.images.len())
    }
}
