// Status Reporter Port
// Best-effort writes of job status to the external record store

use crate::domain::JobStatus;
use async_trait::async_trait;
use thiserror::Error;

/// Reporting errors
///
/// Never escalated: callers log and drop them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Record store returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Record store rejected mutation: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Status reporter trait
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Record `status` (and optional `result`) for `chat_id`
    async fn report(
        &self,
        chat_id: &str,
        status: JobStatus,
        result: Option<&str>,
    ) -> Result<(), ReportError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// One recorded report call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ReportCall {
        pub chat_id: String,
        pub status: JobStatus,
        pub result: Option<String>,
    }

    /// Mock Status Reporter for testing
    ///
    /// Records every call (including failed ones) and keeps a "record store"
    /// view with the last successfully written state per chat.
    #[derive(Default)]
    pub struct MockStatusReporter {
        calls: Mutex<Vec<ReportCall>>,
        records: Mutex<HashMap<String, (JobStatus, Option<String>)>>,
        failing: Mutex<Vec<JobStatus>>,
    }

    impl MockStatusReporter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reporter whose calls for the given statuses fail
        pub fn new_failing_on(statuses: &[JobStatus]) -> Self {
            let reporter = Self::default();
            *reporter.failing.lock().unwrap() = statuses.to_vec();
            reporter
        }

        pub fn calls(&self) -> Vec<ReportCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn statuses(&self) -> Vec<JobStatus> {
            self.calls().into_iter().map(|c| c.status).collect()
        }

        pub fn record(&self, chat_id: &str) -> Option<(JobStatus, Option<String>)> {
            self.records.lock().unwrap().get(chat_id).cloned()
        }
    }

    #[async_trait]
    impl StatusReporter for MockStatusReporter {
        async fn report(
            &self,
            chat_id: &str,
            status: JobStatus,
            result: Option<&str>,
        ) -> Result<(), ReportError> {
            self.calls.lock().unwrap().push(ReportCall {
                chat_id: chat_id.to_string(),
                status,
                result: result.map(|s| s.to_string()),
            });

            if self.failing.lock().unwrap().contains(&status) {
                return Err(ReportError::Transport("mock network error".to_string()));
            }

            self.records.lock().unwrap().insert(
                chat_id.to_string(),
                (status, result.map(|s| s.to_string())),
            );
            Ok(())
        }
    }
}
