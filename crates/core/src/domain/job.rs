// Analysis Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Job ID (UUID v4, assigned at enqueue time)
pub type JobId = String;

/// Query used when the caller does not send one
pub const DEFAULT_QUERY: &str = "Analyze financial risks";

/// Job status as stored in the external record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to analyze a specific document
///
/// The ids are opaque and caller-supplied. Only presence of `chat_id` and
/// `file_id` is checked, at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub job_id: JobId,
    pub chat_id: String,
    pub file_id: String,
    pub user_id: Option<String>,
    pub query: String,
}

impl AnalysisJob {
    /// Create a job, falling back to [`DEFAULT_QUERY`] when no query was sent
    pub fn new(
        job_id: impl Into<String>,
        chat_id: impl Into<String>,
        file_id: impl Into<String>,
        user_id: Option<String>,
        query: Option<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            chat_id: chat_id.into(),
            file_id: file_id.into(),
            user_id,
            query: query.unwrap_or_else(|| DEFAULT_QUERY.to_string()),
        }
    }

    /// Create a test job with a deterministic ID (for tests only)
    pub fn new_test(chat_id: &str, file_id: &str) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-{}", counter),
            chat_id,
            file_id,
            Some("test-user".to_string()),
            None,
        )
    }
}

/// Status progression of a single job, as seen by one worker invocation
///
/// Queued -> Processing -> (Completed | Failed). Terminal states are final,
/// so at most one terminal status can ever be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLifecycle {
    status: JobStatus,
}

impl Default for JobLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl JobLifecycle {
    pub fn new() -> Self {
        Self {
            status: JobStatus::Queued,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Transition to Processing
    pub fn begin_processing(&mut self) -> Result<JobStatus> {
        self.transition(JobStatus::Queued, JobStatus::Processing)
    }

    /// Transition to Completed
    pub fn complete(&mut self) -> Result<JobStatus> {
        self.transition(JobStatus::Processing, JobStatus::Completed)
    }

    /// Transition to Failed
    pub fn fail(&mut self) -> Result<JobStatus> {
        self.transition(JobStatus::Processing, JobStatus::Failed)
    }

    fn transition(&mut self, expected: JobStatus, next: JobStatus) -> Result<JobStatus> {
        if self.status != expected {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(next)
    }
}
