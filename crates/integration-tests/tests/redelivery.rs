//! Redelivery of abandoned claims against the SQLite queue

use std::sync::Arc;

use findoc_core::application::{LifecycleController, LifecycleSettings, RedeliveryService, Worker};
use findoc_core::domain::{AnalysisJob, JobStatus, QueueState, WorkItem};
use findoc_core::port::analysis_pipeline::mocks::MockAnalysisPipeline;
use findoc_core::port::document_fetcher::mocks::MockDocumentFetcher;
use findoc_core::port::status_reporter::mocks::MockStatusReporter;
use findoc_core::port::time_provider::FixedTimeProvider;
use findoc_core::port::WorkQueue;
use findoc_infra_sqlite::{create_pool, run_migrations, SqliteWorkQueue};

const CHANNEL: &str = "financial_analysis";
const VISIBILITY_MS: i64 = 120_000;
const START: i64 = 1_700_000_000_000;

struct Fixture {
    _dir: tempfile::TempDir,
    time: Arc<FixedTimeProvider>,
    queue: Arc<SqliteWorkQueue>,
    reporter: Arc<MockStatusReporter>,
    redelivery: RedeliveryService,
}

async fn fixture(max_deliveries: i32) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let time = Arc::new(FixedTimeProvider::new(START));
    let queue = Arc::new(SqliteWorkQueue::new(pool, time.clone()));
    let reporter = Arc::new(MockStatusReporter::new());
    let redelivery = RedeliveryService::new(
        queue.clone(),
        reporter.clone(),
        time.clone(),
        Some(VISIBILITY_MS),
        Some(max_deliveries),
    );

    Fixture {
        _dir: dir,
        time,
        queue,
        reporter,
        redelivery,
    }
}

async fn enqueue(f: &Fixture, job_id: &str) {
    let job = AnalysisJob::new(job_id, "c1", "f1", None, Some("test".to_string()));
    f.queue
        .enqueue(&WorkItem::new(job, CHANNEL, START))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_crashed_claim_is_redelivered_and_completed() {
    let f = fixture(3).await;
    enqueue(&f, "job-1").await;

    // A worker claims the item and dies without finishing it
    let claimed = f.queue.claim_next(CHANNEL, "crashed").await.unwrap().unwrap();
    assert_eq!(claimed.deliveries, 1);

    // Still inside the visibility timeout: nothing happens
    f.time.advance(VISIBILITY_MS / 2);
    let report = f.redelivery.redeliver_stale().await.unwrap();
    assert_eq!(report.requeued, 0);

    f.time.advance(VISIBILITY_MS);
    let report = f.redelivery.redeliver_stale().await.unwrap();
    assert_eq!(report.requeued, 1);
    assert_eq!(report.buried, 0);

    let item = f.queue.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
    assert_eq!(item.state, QueueState::Queued);
    assert!(item.claimed_by.is_none());

    // A healthy worker picks it up and runs it to completion
    let scratch = tempfile::tempdir().unwrap();
    let controller = Arc::new(LifecycleController::new(
        Arc::new(MockDocumentFetcher::new_bytes(b"%PDF".to_vec())),
        Arc::new(MockAnalysisPipeline::new_report("OK")),
        f.reporter.clone(),
        LifecycleSettings {
            scratch_dir: scratch.path().to_path_buf(),
        },
    ));
    let worker = Worker::new("healthy", CHANNEL, f.queue.clone(), controller);

    assert!(worker.process_next_job().await.unwrap());

    let item = f.queue.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
    assert_eq!(item.state, QueueState::Done);
    assert_eq!(item.deliveries, 2);
    assert_eq!(
        f.reporter.record("c1"),
        Some((JobStatus::Completed, Some("OK".to_string())))
    );
}

#[tokio::test]
async fn test_repeatedly_abandoned_item_is_buried_and_reported_failed() {
    let f = fixture(2).await;
    enqueue(&f, "job-1").await;

    for _ in 0..2 {
        f.queue.claim_next(CHANNEL, "crashed").await.unwrap().unwrap();
        f.time.advance(VISIBILITY_MS + 1);
        f.redelivery.redeliver_stale().await.unwrap();
    }

    let item = f.queue.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
    assert_eq!(item.state, QueueState::Dead);
    assert_eq!(item.deliveries, 2);
    assert!(f.queue.claim_next(CHANNEL, "w").await.unwrap().is_none());

    let (status, result) = f.reporter.record("c1").unwrap();
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(
        result.as_deref(),
        Some("Error: job abandoned after 2 delivery attempts")
    );
}

#[tokio::test]
async fn test_heartbeat_keeps_long_job_claimed() {
    let f = fixture(3).await;
    enqueue(&f, "job-1").await;

    f.queue.claim_next(CHANNEL, "busy").await.unwrap().unwrap();

    // The owner keeps beating well past the original visibility window
    for _ in 0..5 {
        f.time.advance(VISIBILITY_MS / 2);
        f.queue.heartbeat(&"job-1".to_string(), "busy").await.unwrap();
    }

    let report = f.redelivery.redeliver_stale().await.unwrap();
    assert_eq!(report.requeued, 0);
    let item = f.queue.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
    assert_eq!(item.state, QueueState::Claimed);
    assert_eq!(item.claimed_by.as_deref(), Some("busy"));
}
