// Job Lifecycle Controller
//
// One linear pass per dequeued job:
//   processing -> fetch -> analyze -> (completed | failed) -> scratch cleanup

mod panic_guard;
pub mod scratch;

pub use panic_guard::describe_join_error;
pub use scratch::ScratchFile;

use crate::domain::{AnalysisJob, JobLifecycle, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{AnalysisPipeline, AnalysisRequest, DocumentFetcher, StatusReporter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Controller settings
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Directory holding scratch documents
    pub scratch_dir: PathBuf,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Terminal result of one controller invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { report_len: usize },
    Failed { reason: String },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Job Lifecycle Controller
pub struct LifecycleController {
    fetcher: Arc<dyn DocumentFetcher>,
    pipeline: Arc<dyn AnalysisPipeline>,
    reporter: Arc<dyn StatusReporter>,
    settings: LifecycleSettings,
}

impl LifecycleController {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        pipeline: Arc<dyn AnalysisPipeline>,
        reporter: Arc<dyn StatusReporter>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            fetcher,
            pipeline,
            reporter,
            settings,
        }
    }

    /// Run one job to a terminal status
    ///
    /// Never fails: fetch/analysis errors (and panics) become a `failed`
    /// report. Exactly one terminal status is reported, and the scratch file
    /// is gone when this returns.
    pub async fn execute(&self, job: &AnalysisJob) -> JobOutcome {
        info!(job_id = %job.job_id, chat_id = %job.chat_id, file_id = %job.file_id, "Job started");

        let mut lifecycle = JobLifecycle::new();
        match lifecycle.begin_processing() {
            Ok(status) => self.report_best_effort(job, status, None).await,
            Err(e) => error!(job_id = %job.job_id, error = %e, "Illegal status transition"),
        }

        let mut scratch = ScratchFile::for_file_id(&self.settings.scratch_dir, &job.file_id);

        // Fetch + analyze run on their own task so a collaborator panic
        // cannot take the worker down with it
        let handle = tokio::spawn(fetch_and_analyze(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.pipeline),
            job.clone(),
            scratch.path().to_path_buf(),
        ));
        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(AppError::Internal(describe_join_error(join_err))),
        };

        let (transition, outcome, result_text) = match result {
            Ok(report) => {
                info!(job_id = %job.job_id, report_len = report.len(), "Job completed");
                let outcome = JobOutcome::Completed {
                    report_len: report.len(),
                };
                (lifecycle.complete(), outcome, report)
            }
            Err(e) => {
                let reason = format!("Error: {}", e);
                error!(job_id = %job.job_id, error = %e, "Job failed");
                let outcome = JobOutcome::Failed {
                    reason: reason.clone(),
                };
                (lifecycle.fail(), outcome, reason)
            }
        };

        match transition {
            Ok(status) => {
                self.report_best_effort(job, status, Some(&result_text))
                    .await
            }
            Err(e) => error!(job_id = %job.job_id, error = %e, "Illegal status transition"),
        }

        scratch.remove().await;
        outcome
    }

    /// Report a status; a failed report is logged and dropped
    async fn report_best_effort(&self, job: &AnalysisJob, status: JobStatus, result: Option<&str>) {
        if let Err(e) = self.reporter.report(&job.chat_id, status, result).await {
            warn!(
                job_id = %job.job_id,
                chat_id = %job.chat_id,
                status = %status,
                error = %e,
                "Status report failed (ignored)"
            );
        }
    }
}

/// Download the document, then hand it to the pipeline
async fn fetch_and_analyze(
    fetcher: Arc<dyn DocumentFetcher>,
    pipeline: Arc<dyn AnalysisPipeline>,
    job: AnalysisJob,
    scratch_path: PathBuf,
) -> Result<String> {
    ensure_parent_dir(&scratch_path).await?;

    let document = fetcher.fetch(&job.file_id, &scratch_path).await?;
    info!(
        job_id = %job.job_id,
        bytes = document.bytes,
        path = %document.path.display(),
        "Document downloaded, starting analysis"
    );

    let report = pipeline
        .analyze(AnalysisRequest {
            query: job.query.clone(),
            file_path: document.path.to_string_lossy().into_owned(),
        })
        .await?;

    Ok(report.raw)
}

async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::analysis_pipeline::mocks::MockAnalysisPipeline;
    use crate::port::document_fetcher::mocks::{MockDocumentFetcher, MockFetchBehavior};
    use crate::port::status_reporter::mocks::MockStatusReporter;
    use crate::port::FetchError;

    struct Harness {
        fetcher: Arc<MockDocumentFetcher>,
        pipeline: Arc<MockAnalysisPipeline>,
        reporter: Arc<MockStatusReporter>,
        controller: LifecycleController,
        _dir: tempfile::TempDir,
        scratch_dir: PathBuf,
    }

    fn harness(
        fetcher: MockDocumentFetcher,
        pipeline: MockAnalysisPipeline,
        reporter: MockStatusReporter,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let scratch_dir = dir.path().join("scratch");
        let fetcher = Arc::new(fetcher);
        let pipeline = Arc::new(pipeline);
        let reporter = Arc::new(reporter);
        let controller = LifecycleController::new(
            fetcher.clone(),
            pipeline.clone(),
            reporter.clone(),
            LifecycleSettings {
                scratch_dir: scratch_dir.clone(),
            },
        );
        Harness {
            fetcher,
            pipeline,
            reporter,
            controller,
            _dir: dir,
            scratch_dir,
        }
    }

    fn test_job() -> AnalysisJob {
        AnalysisJob::new("j1", "c1", "f1", Some("u1".to_string()), Some("test".to_string()))
    }

    #[tokio::test]
    async fn test_success_reports_completed_with_report() {
        let h = harness(
            MockDocumentFetcher::new_bytes(b"%PDF-1.7 fixed".to_vec()),
            MockAnalysisPipeline::new_report("OK"),
            MockStatusReporter::new(),
        );

        let outcome = h.controller.execute(&test_job()).await;

        assert_eq!(outcome, JobOutcome::Completed { report_len: 2 });
        assert_eq!(
            h.reporter.statuses(),
            vec![JobStatus::Processing, JobStatus::Completed]
        );
        assert_eq!(
            h.reporter.record("c1"),
            Some((JobStatus::Completed, Some("OK".to_string())))
        );

        // Pipeline saw the downloaded file and the caller's query
        let requests = h.pipeline.requests();
        assert_eq!(requests[0].query, "test");
        assert!(requests[0].file_path.ends_with("f1.pdf"));
        assert_eq!(h.pipeline.saw_file(), vec![true]);

        assert!(!h.scratch_dir.join("f1.pdf").exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_analysis() {
        let h = harness(
            MockDocumentFetcher::new_fail(FetchError::HttpStatus(404)),
            MockAnalysisPipeline::new_report("unused"),
            MockStatusReporter::new(),
        );

        let outcome = h.controller.execute(&test_job()).await;

        assert_eq!(outcome.status(), JobStatus::Failed);
        assert_eq!(h.pipeline.call_count(), 0);

        let (status, result) = h.reporter.record("c1").unwrap();
        assert_eq!(status, JobStatus::Failed);
        let result = result.unwrap();
        assert!(result.starts_with("Error: "));
        assert!(result.contains("404"));
    }

    #[tokio::test]
    async fn test_partial_download_is_cleaned_up() {
        let h = harness(
            MockDocumentFetcher::new(MockFetchBehavior::PartialThenFail(
                b"%PDF-half".to_vec(),
                FetchError::Transport("connection reset".to_string()),
            )),
            MockAnalysisPipeline::new_report("unused"),
            MockStatusReporter::new(),
        );

        let outcome = h.controller.execute(&test_job()).await;

        assert_eq!(outcome.status(), JobStatus::Failed);
        assert_eq!(h.fetcher.call_count(), 1);
        assert!(!h.scratch_dir.join("f1.pdf").exists());
    }

    #[tokio::test]
    async fn test_analysis_failure_reports_failed_and_cleans_up() {
        let h = harness(
            MockDocumentFetcher::new_bytes(b"%PDF".to_vec()),
            MockAnalysisPipeline::new_fail("LLM quota exceeded"),
            MockStatusReporter::new(),
        );

        let outcome = h.controller.execute(&test_job()).await;

        match outcome {
            JobOutcome::Failed { reason } => assert!(reason.contains("LLM quota exceeded")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            h.reporter.statuses(),
            vec![JobStatus::Processing, JobStatus::Failed]
        );
        assert!(!h.scratch_dir.join("f1.pdf").exists());
    }

    #[tokio::test]
    async fn test_analysis_panic_becomes_failed() {
        let h = harness(
            MockDocumentFetcher::new_bytes(b"%PDF".to_vec()),
            MockAnalysisPipeline::new_panic_inducing("agent crashed"),
            MockStatusReporter::new(),
        );

        let outcome = h.controller.execute(&test_job()).await;

        match outcome {
            JobOutcome::Failed { reason } => assert!(reason.contains("agent crashed")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.reporter.statuses().len(), 2);
        assert!(!h.scratch_dir.join("f1.pdf").exists());
    }

    #[tokio::test]
    async fn test_processing_report_failure_is_not_fatal() {
        let h = harness(
            MockDocumentFetcher::new_bytes(b"%PDF".to_vec()),
            MockAnalysisPipeline::new_report("OK"),
            MockStatusReporter::new_failing_on(&[JobStatus::Processing]),
        );

        let outcome = h.controller.execute(&test_job()).await;

        assert_eq!(outcome.status(), JobStatus::Completed);
        assert_eq!(h.fetcher.call_count(), 1);
        assert_eq!(h.pipeline.call_count(), 1);
        assert_eq!(
            h.reporter.record("c1"),
            Some((JobStatus::Completed, Some("OK".to_string())))
        );
    }

    #[tokio::test]
    async fn test_terminal_report_failure_still_cleans_up() {
        let h = harness(
            MockDocumentFetcher::new_bytes(b"%PDF".to_vec()),
            MockAnalysisPipeline::new_report("OK"),
            MockStatusReporter::new_failing_on(&[JobStatus::Completed]),
        );

        let outcome = h.controller.execute(&test_job()).await;

        // Outcome reflects the job, not the reporting
        assert_eq!(outcome.status(), JobStatus::Completed);
        assert_eq!(
            h.reporter.statuses(),
            vec![JobStatus::Processing, JobStatus::Completed]
        );
        assert!(!h.scratch_dir.join("f1.pdf").exists());
    }

    #[tokio::test]
    async fn test_existing_scratch_file_is_overwritten_and_removed() {
        let h = harness(
            MockDocumentFetcher::new_bytes(b"fresh".to_vec()),
            MockAnalysisPipeline::new_report("OK"),
            MockStatusReporter::new(),
        );
        std::fs::create_dir_all(&h.scratch_dir).unwrap();
        std::fs::write(h.scratch_dir.join("f1.pdf"), b"stale leftover").unwrap();

        let outcome = h.controller.execute(&test_job()).await;

        assert_eq!(outcome.status(), JobStatus::Completed);
        assert!(!h.scratch_dir.join("f1.pdf").exists());
    }
}
