// SQLite WorkQueue Implementation

use crate::error::{map_enqueue_error, map_sqlx_error};
use async_trait::async_trait;
use findoc_core::domain::{AnalysisJob, JobId, QueueState, WorkItem};
use findoc_core::error::{AppError, Result};
use findoc_core::port::{EnqueueError, TimeProvider, WorkQueue};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

pub struct SqliteWorkQueue {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteWorkQueue {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Fail with NotFound when an UPDATE matched nothing
    fn expect_row(rows: u64, id: &JobId, op: &str) -> Result<()> {
        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "{}: no matching work item {}",
                op, id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn enqueue(&self, item: &WorkItem) -> std::result::Result<(), EnqueueError> {
        sqlx::query(
            r#"
            INSERT INTO work_items (
                job_id, channel, state,
                chat_id, file_id, user_id, query,
                deliveries, enqueued_at, claimed_at, claimed_by,
                heartbeat_at, finished_at, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.job.job_id)
        .bind(&item.channel)
        .bind(item.state.as_str())
        .bind(&item.job.chat_id)
        .bind(&item.job.file_id)
        .bind(&item.job.user_id)
        .bind(&item.job.query)
        .bind(item.deliveries)
        .bind(item.enqueued_at)
        .bind(item.claimed_at)
        .bind(&item.claimed_by)
        .bind(item.heartbeat_at)
        .bind(item.finished_at)
        .bind(&item.last_error)
        .execute(&self.pool)
        .await
        .map_err(map_enqueue_error)?;

        Ok(())
    }

    async fn claim_next(&self, channel: &str, worker_id: &str) -> Result<Option<WorkItem>> {
        let now = self.time_provider.now_millis();

        // Single statement: the row moves QUEUED -> CLAIMED atomically, so two
        // workers can never claim the same item
        let row = sqlx::query_as::<_, WorkItemRow>(
            r#"
            UPDATE work_items
            SET state = ?, deliveries = deliveries + 1,
                claimed_at = ?, heartbeat_at = ?, claimed_by = ?
            WHERE seq = (
                SELECT seq FROM work_items
                WHERE channel = ? AND state = ?
                ORDER BY seq ASC
                LIMIT 1
            )
            AND state = ?
            RETURNING *
            "#,
        )
        .bind(QueueState::Claimed.as_str())
        .bind(now)
        .bind(now)
        .bind(worker_id)
        .bind(channel)
        .bind(QueueState::Queued.as_str())
        .bind(QueueState::Queued.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let item = row.into_work_item()?;
                debug!(job_id = %item.id(), worker_id, "Claimed work item");
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    async fn heartbeat(&self, id: &JobId, worker_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET heartbeat_at = ?
            WHERE job_id = ? AND state = ? AND claimed_by = ?
            "#,
        )
        .bind(self.time_provider.now_millis())
        .bind(id)
        .bind(QueueState::Claimed.as_str())
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Self::expect_row(result.rows_affected(), id, "heartbeat")
    }

    async fn finish(&self, id: &JobId, worker_id: &str) -> Result<()> {
        // A QUEUED item here was requeued while its worker was still alive;
        // it has been processed now, so it must not be delivered again.
        // Once another worker holds the claim, that worker finishes it.
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET state = ?, finished_at = ?
            WHERE job_id = ?
            AND (state = ? OR (state = ? AND claimed_by = ?))
            "#,
        )
        .bind(QueueState::Done.as_str())
        .bind(self.time_provider.now_millis())
        .bind(id)
        .bind(QueueState::Queued.as_str())
        .bind(QueueState::Claimed.as_str())
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Self::expect_row(result.rows_affected(), id, "finish")
    }

    async fn requeue(&self, id: &JobId, reason: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET state = ?, claimed_at = NULL, claimed_by = NULL,
                heartbeat_at = NULL, last_error = ?
            WHERE job_id = ? AND state = ?
            "#,
        )
        .bind(QueueState::Queued.as_str())
        .bind(reason)
        .bind(id)
        .bind(QueueState::Claimed.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Self::expect_row(result.rows_affected(), id, "requeue")
    }

    async fn bury(&self, id: &JobId, reason: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET state = ?, finished_at = ?, last_error = ?
            WHERE job_id = ? AND state IN (?, ?)
            "#,
        )
        .bind(QueueState::Dead.as_str())
        .bind(self.time_provider.now_millis())
        .bind(reason)
        .bind(id)
        .bind(QueueState::Claimed.as_str())
        .bind(QueueState::Queued.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Self::expect_row(result.rows_affected(), id, "bury")
    }

    async fn find_stale_claims(&self, seen_before: i64) -> Result<Vec<WorkItem>> {
        let rows = sqlx::query_as::<_, WorkItemRow>(
            r#"
            SELECT * FROM work_items
            WHERE state = ?
              AND COALESCE(heartbeat_at, claimed_at, 0) < ?
            ORDER BY seq ASC
            "#,
        )
        .bind(QueueState::Claimed.as_str())
        .bind(seen_before)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(WorkItemRow::into_work_item).collect()
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<WorkItem>> {
        let row = sqlx::query_as::<_, WorkItemRow>("SELECT * FROM work_items WHERE job_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(WorkItemRow::into_work_item).transpose()
    }

    async fn count_by_state(&self, channel: &str, state: QueueState) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM work_items WHERE channel = ? AND state = ?")
                .bind(channel)
                .bind(state.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct WorkItemRow {
    job_id: String,
    channel: String,
    state: String,
    chat_id: String,
    file_id: String,
    user_id: Option<String>,
    query: String,
    deliveries: i32,
    enqueued_at: i64,
    claimed_at: Option<i64>,
    claimed_by: Option<String>,
    heartbeat_at: Option<i64>,
    finished_at: Option<i64>,
    last_error: Option<String>,
}

impl WorkItemRow {
    fn into_work_item(self) -> Result<WorkItem> {
        let state = QueueState::parse(&self.state).ok_or_else(|| {
            AppError::Database(format!(
                "Unknown queue state '{}' for work item {}",
                self.state, self.job_id
            ))
        })?;

        Ok(WorkItem {
            job: AnalysisJob {
                job_id: self.job_id,
                chat_id: self.chat_id,
                file_id: self.file_id,
                user_id: self.user_id,
                query: self.query,
            },
            channel: self.channel,
            state,
            deliveries: self.deliveries,
            enqueued_at: self.enqueued_at,
            claimed_at: self.claimed_at,
            claimed_by: self.claimed_by,
            heartbeat_at: self.heartbeat_at,
            finished_at: self.finished_at,
            last_error: self.last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use findoc_core::port::time_provider::FixedTimeProvider;

    const CHANNEL: &str = "financial_analysis";

    async fn setup_test_db() -> (SqlitePool, Arc<FixedTimeProvider>) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, Arc::new(FixedTimeProvider::new(1_000)))
    }

    fn item(chat_id: &str) -> WorkItem {
        WorkItem::new(AnalysisJob::new_test(chat_id, "f1"), CHANNEL, 1_000)
    }

    #[tokio::test]
    async fn test_enqueue_and_find() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool, time);

        let item = item("c1");
        queue.enqueue(&item).await.unwrap();

        let found = queue.find_by_id(&item.job.job_id).await.unwrap().unwrap();
        assert_eq!(found.job, item.job);
        assert_eq!(found.state, QueueState::Queued);
        assert_eq!(found.deliveries, 0);
    }

    #[tokio::test]
    async fn test_duplicate_job_id_is_rejected() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool, time);

        let item = item("c1");
        queue.enqueue(&item).await.unwrap();
        let err = queue.enqueue(&item).await.unwrap_err();
        assert!(matches!(err, EnqueueError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool.clone(), time);
        pool.close().await;

        let err = queue.enqueue(&item("c1")).await.unwrap_err();
        assert!(matches!(err, EnqueueError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_exclusive() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool, time);

        let first = item("c1");
        let second = item("c2");
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        let a = queue.claim_next(CHANNEL, "w1").await.unwrap().unwrap();
        let b = queue.claim_next(CHANNEL, "w2").await.unwrap().unwrap();
        assert!(queue.claim_next(CHANNEL, "w3").await.unwrap().is_none());

        assert_eq!(a.job.job_id, first.job.job_id);
        assert_eq!(b.job.job_id, second.job.job_id);
        assert_eq!(a.state, QueueState::Claimed);
        assert_eq!(a.deliveries, 1);
        assert_eq!(a.claimed_by.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_claim_respects_channel() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool, time);

        queue.enqueue(&item("c1")).await.unwrap();
        assert!(queue.claim_next("other", "w1").await.unwrap().is_none());
        assert!(queue.claim_next(CHANNEL, "w1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_heartbeat_requires_ownership() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool, time.clone());

        let item = item("c1");
        queue.enqueue(&item).await.unwrap();
        queue.claim_next(CHANNEL, "w1").await.unwrap();

        time.advance(5_000);
        queue.heartbeat(&item.job.job_id, "w1").await.unwrap();
        let found = queue.find_by_id(&item.job.job_id).await.unwrap().unwrap();
        assert_eq!(found.heartbeat_at, Some(6_000));

        assert!(queue.heartbeat(&item.job.job_id, "intruder").await.is_err());
    }

    #[tokio::test]
    async fn test_stale_claim_requeue_and_redeliver() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool, time.clone());

        let item = item("c1");
        queue.enqueue(&item).await.unwrap();
        queue.claim_next(CHANNEL, "w1").await.unwrap();

        // Not stale yet
        assert!(queue.find_stale_claims(1_000).await.unwrap().is_empty());

        time.advance(60_000);
        let stale = queue.find_stale_claims(2_000).await.unwrap();
        assert_eq!(stale.len(), 1);

        queue
            .requeue(&item.job.job_id, "worker stopped heartbeating")
            .await
            .unwrap();
        let redelivered = queue.claim_next(CHANNEL, "w2").await.unwrap().unwrap();
        assert_eq!(redelivered.deliveries, 2);
        assert_eq!(redelivered.claimed_by.as_deref(), Some("w2"));
        assert_eq!(
            redelivered.last_error.as_deref(),
            Some("worker stopped heartbeating")
        );
    }

    #[tokio::test]
    async fn test_finish_and_bury_are_terminal() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool, time);

        let done = item("c1");
        let dead = item("c2");
        queue.enqueue(&done).await.unwrap();
        queue.enqueue(&dead).await.unwrap();
        queue.claim_next(CHANNEL, "w1").await.unwrap();
        queue.claim_next(CHANNEL, "w1").await.unwrap();

        queue.finish(&done.job.job_id, "w1").await.unwrap();
        queue.bury(&dead.job.job_id, "abandoned").await.unwrap();

        assert_eq!(queue.count_by_state(CHANNEL, QueueState::Done).await.unwrap(), 1);
        assert_eq!(queue.count_by_state(CHANNEL, QueueState::Dead).await.unwrap(), 1);

        // A finished item cannot be requeued
        assert!(queue.requeue(&done.job.job_id, "late").await.is_err());
        assert!(queue.claim_next(CHANNEL, "w2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_late_finish_does_not_steal_redelivered_claim() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool, time);

        let item = item("c1");
        let id = item.job.job_id.clone();
        queue.enqueue(&item).await.unwrap();

        // w1 goes quiet, the item is redelivered to w2
        queue.claim_next(CHANNEL, "w1").await.unwrap();
        queue.requeue(&id, "worker stopped heartbeating").await.unwrap();
        queue.claim_next(CHANNEL, "w2").await.unwrap().unwrap();

        // w1 resurfaces and tries to finish: the claim is no longer its own
        let err = queue.finish(&id, "w1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let found = queue.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.state, QueueState::Claimed);
        assert_eq!(found.claimed_by.as_deref(), Some("w2"));

        queue.finish(&id, "w2").await.unwrap();
        let found = queue.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.state, QueueState::Done);
    }

    #[tokio::test]
    async fn test_finish_of_requeued_item_prevents_redelivery() {
        let (pool, time) = setup_test_db().await;
        let queue = SqliteWorkQueue::new(pool, time);

        let item = item("c1");
        let id = item.job.job_id.clone();
        queue.enqueue(&item).await.unwrap();
        queue.claim_next(CHANNEL, "w1").await.unwrap();
        queue.requeue(&id, "worker stopped heartbeating").await.unwrap();

        queue.finish(&id, "w1").await.unwrap();

        assert!(queue.claim_next(CHANNEL, "w2").await.unwrap().is_none());
        assert_eq!(queue.count_by_state(CHANNEL, QueueState::Done).await.unwrap(), 1);
    }
}
