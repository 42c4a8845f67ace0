// Work Queue Port (durable hand-off between intake and workers)

use crate::domain::{JobId, QueueState, WorkItem};
use crate::error::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Enqueue failures (the only error that reaches an intake caller)
#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Queue rejected work item: {0}")]
    Rejected(String),
}

/// Durable work queue
///
/// Delivery is at-most-one-worker-at-a-time: `claim_next` must atomically
/// move a single QUEUED item to CLAIMED.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Persist a new QUEUED item
    async fn enqueue(&self, item: &WorkItem) -> std::result::Result<(), EnqueueError>;

    /// Claim the oldest QUEUED item of a channel for `worker_id`
    async fn claim_next(&self, channel: &str, worker_id: &str) -> Result<Option<WorkItem>>;

    /// Refresh the liveness timestamp of a CLAIMED item
    async fn heartbeat(&self, id: &JobId, worker_id: &str) -> Result<()>;

    /// Mark an item DONE: one CLAIMED by `worker_id`, or one requeued and
    /// not yet claimed again. An item now claimed by another worker is left
    /// alone and `AppError::NotFound` is returned.
    async fn finish(&self, id: &JobId, worker_id: &str) -> Result<()>;

    /// Return a CLAIMED item to QUEUED (redelivery)
    async fn requeue(&self, id: &JobId, reason: &str) -> Result<()>;

    /// Move an item to DEAD (no further deliveries)
    async fn bury(&self, id: &JobId, reason: &str) -> Result<()>;

    /// Find CLAIMED items whose last heartbeat is older than `seen_before` (epoch ms)
    async fn find_stale_claims(&self, seen_before: i64) -> Result<Vec<WorkItem>>;

    /// Find item by job ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<WorkItem>>;

    /// Count items by state
    async fn count_by_state(&self, channel: &str, state: QueueState) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory queue for tests
    ///
    /// Keeps every item ever enqueued; `claim_next` walks them in FIFO order.
    #[derive(Default)]
    pub struct MockWorkQueue {
        items: Mutex<VecDeque<WorkItem>>,
        unavailable: Mutex<bool>,
    }

    impl MockWorkQueue {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue that refuses every enqueue
        pub fn new_unavailable() -> Self {
            let queue = Self::default();
            *queue.unavailable.lock().unwrap() = true;
            queue
        }

        pub fn items(&self) -> Vec<WorkItem> {
            self.items.lock().unwrap().iter().cloned().collect()
        }

        /// Set the heartbeat of an item directly (simulates a live worker)
        pub fn touch(&self, id: &str, at: i64) {
            if let Some(item) = self.items.lock().unwrap().iter_mut().find(|i| i.id() == id) {
                item.heartbeat_at = Some(at);
            }
        }

        fn update<F: FnOnce(&mut WorkItem)>(&self, id: &JobId, f: F) -> Result<()> {
            let mut items = self.items.lock().unwrap();
            let item = items
                .iter_mut()
                .find(|i| i.id() == id)
                .ok_or_else(|| AppError::NotFound(format!("Work item {} not found", id)))?;
            f(item);
            Ok(())
        }
    }

    #[async_trait]
    impl WorkQueue for MockWorkQueue {
        async fn enqueue(&self, item: &WorkItem) -> std::result::Result<(), EnqueueError> {
            if *self.unavailable.lock().unwrap() {
                return Err(EnqueueError::Unavailable("mock queue offline".to_string()));
            }
            self.items.lock().unwrap().push_back(item.clone());
            Ok(())
        }

        async fn claim_next(&self, channel: &str, worker_id: &str) -> Result<Option<WorkItem>> {
            let mut items = self.items.lock().unwrap();
            let claimed = items
                .iter_mut()
                .find(|i| i.channel == channel && i.state == QueueState::Queued)
                .map(|item| {
                    item.state = QueueState::Claimed;
                    item.deliveries += 1;
                    item.claimed_by = Some(worker_id.to_string());
                    item.clone()
                });
            Ok(claimed)
        }

        async fn heartbeat(&self, id: &JobId, _worker_id: &str) -> Result<()> {
            self.update(id, |item| {
                item.heartbeat_at = Some(item.heartbeat_at.unwrap_or(0) + 1);
            })
        }

        async fn finish(&self, id: &JobId, worker_id: &str) -> Result<()> {
            let mut items = self.items.lock().unwrap();
            let item = items
                .iter_mut()
                .find(|i| {
                    i.id() == id
                        && (i.state == QueueState::Queued
                            || (i.state == QueueState::Claimed
                                && i.claimed_by.as_deref() == Some(worker_id)))
                })
                .ok_or_else(|| AppError::NotFound(format!("finish: no matching work item {}", id)))?;
            item.state = QueueState::Done;
            Ok(())
        }

        async fn requeue(&self, id: &JobId, reason: &str) -> Result<()> {
            self.update(id, |item| {
                item.state = QueueState::Queued;
                item.claimed_by = None;
                item.last_error = Some(reason.to_string());
            })
        }

        async fn bury(&self, id: &JobId, reason: &str) -> Result<()> {
            self.update(id, |item| {
                item.state = QueueState::Dead;
                item.last_error = Some(reason.to_string());
            })
        }

        async fn find_stale_claims(&self, seen_before: i64) -> Result<Vec<WorkItem>> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.state == QueueState::Claimed)
                .filter(|i| i.last_seen_at().map_or(true, |t| t < seen_before))
                .cloned()
                .collect())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<WorkItem>> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.id() == id)
                .cloned())
        }

        async fn count_by_state(&self, channel: &str, state: QueueState) -> Result<i64> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.channel == channel && i.state == state)
                .count() as i64)
        }
    }
}
