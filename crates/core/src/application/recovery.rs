// Redelivery of work items abandoned by crashed workers
use crate::domain::{JobStatus, WorkItem};
use crate::error::Result;
use crate::port::{StatusReporter, TimeProvider, WorkQueue};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::worker::constants::{DEFAULT_MAX_DELIVERIES, DEFAULT_VISIBILITY_TIMEOUT_MS};

/// Outcome of one redelivery sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedeliveryReport {
    pub requeued: usize,
    pub buried: usize,
}

/// Redelivery service
///
/// A CLAIMED item whose owner stopped heartbeating for longer than the
/// visibility timeout is handed back to the queue, or buried once it has been
/// delivered `max_deliveries` times.
pub struct RedeliveryService {
    queue: Arc<dyn WorkQueue>,
    reporter: Arc<dyn StatusReporter>,
    time_provider: Arc<dyn TimeProvider>,
    visibility_timeout_ms: i64,
    max_deliveries: i32,
}

impl RedeliveryService {
    /// Create a new redelivery service
    ///
    /// # Arguments
    /// * `visibility_timeout_ms` - Silence after which a claim is abandoned (default: 2 minutes)
    /// * `max_deliveries` - Deliveries before an item is buried (default: 3)
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        reporter: Arc<dyn StatusReporter>,
        time_provider: Arc<dyn TimeProvider>,
        visibility_timeout_ms: Option<i64>,
        max_deliveries: Option<i32>,
    ) -> Self {
        Self {
            queue,
            reporter,
            time_provider,
            visibility_timeout_ms: visibility_timeout_ms.unwrap_or(DEFAULT_VISIBILITY_TIMEOUT_MS),
            max_deliveries: max_deliveries.unwrap_or(DEFAULT_MAX_DELIVERIES),
        }
    }

    /// Requeue or bury every stale claim
    pub async fn redeliver_stale(&self) -> Result<RedeliveryReport> {
        let cutoff = self.time_provider.now_millis() - self.visibility_timeout_ms;
        let stale = self.queue.find_stale_claims(cutoff).await?;

        let mut report = RedeliveryReport::default();
        for item in stale {
            if item.deliveries < self.max_deliveries {
                warn!(
                    job_id = %item.id(),
                    claimed_by = ?item.claimed_by,
                    deliveries = item.deliveries,
                    "Stale claim, requeueing"
                );
                self.queue
                    .requeue(&item.job.job_id, "worker stopped heartbeating")
                    .await?;
                report.requeued += 1;
            } else {
                self.bury(&item).await?;
                report.buried += 1;
            }
        }

        if report.requeued > 0 || report.buried > 0 {
            info!(
                requeued = report.requeued,
                buried = report.buried,
                "Redelivery sweep complete"
            );
        }
        Ok(report)
    }

    async fn bury(&self, item: &WorkItem) -> Result<()> {
        let reason = format!(
            "Error: job abandoned after {} delivery attempts",
            item.deliveries
        );
        error!(job_id = %item.id(), chat_id = %item.job.chat_id, reason = %reason, "Burying work item");

        self.queue.bury(&item.job.job_id, &reason).await?;

        if let Err(e) = self
            .reporter
            .report(&item.job.chat_id, JobStatus::Failed, Some(&reason))
            .await
        {
            warn!(job_id = %item.id(), error = %e, "Status report failed (ignored)");
        }
        Ok(())
    }
}
