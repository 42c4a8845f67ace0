// Analysis Pipeline Port
// Black-box boundary around the external multi-agent pipeline

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input handed to the pipeline (exactly two values)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub query: String,
    pub file_path: String,
}

/// Pipeline output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Raw text report
    pub raw: String,
}

/// Analysis errors (terminal for the job)
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to start pipeline: {0}")]
    SpawnFailed(String),

    #[error("Pipeline failed (exit code {exit_code:?}): {message}")]
    Failed {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("Pipeline timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid pipeline output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Analysis pipeline trait
///
/// Implementations must build a fresh execution context per call; nothing is
/// shared between jobs.
#[async_trait]
pub trait AnalysisPipeline: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalysisError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Mock pipeline behavior
    #[derive(Debug, Clone)]
    pub enum MockAnalysisBehavior {
        /// Return the given report
        Report(String),
        /// Fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Mock Analysis Pipeline for testing
    pub struct MockAnalysisPipeline {
        behavior: MockAnalysisBehavior,
        requests: Mutex<Vec<AnalysisRequest>>,
        /// Whether the document existed on disk when the pipeline was called
        saw_file: Mutex<Vec<bool>>,
    }

    impl MockAnalysisPipeline {
        pub fn new(behavior: MockAnalysisBehavior) -> Self {
            Self {
                behavior,
                requests: Mutex::new(Vec::new()),
                saw_file: Mutex::new(Vec::new()),
            }
        }

        pub fn new_report(report: impl Into<String>) -> Self {
            Self::new(MockAnalysisBehavior::Report(report.into()))
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockAnalysisBehavior::Fail(message.into()))
        }

        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockAnalysisBehavior::Panic(message.into()))
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<AnalysisRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn saw_file(&self) -> Vec<bool> {
            self.saw_file.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnalysisPipeline for MockAnalysisPipeline {
        async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
            let exists = std::path::Path::new(&request.file_path).exists();
            self.saw_file.lock().unwrap().push(exists);
            self.requests.lock().unwrap().push(request);

            match &self.behavior {
                MockAnalysisBehavior::Report(raw) => Ok(AnalysisReport { raw: raw.clone() }),
                MockAnalysisBehavior::Fail(msg) => Err(AnalysisError::Failed {
                    exit_code: Some(1),
                    message: msg.clone(),
                }),
                MockAnalysisBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
            }
        }
    }
}
