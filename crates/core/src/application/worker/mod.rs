// Worker - claims work items and drives them through the lifecycle controller

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::lifecycle::{JobOutcome, LifecycleController};
use crate::domain::WorkItem;
use crate::error::{AppError, Result};
use crate::port::WorkQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Worker processes work items from one queue channel, one at a time
pub struct Worker {
    worker_id: String,
    channel: String,
    queue: Arc<dyn WorkQueue>,
    controller: Arc<LifecycleController>,
    heartbeat_interval: Duration,
}

impl Worker {
    pub fn new(
        worker_id: impl Into<String>,
        channel: impl Into<String>,
        queue: Arc<dyn WorkQueue>,
        controller: Arc<LifecycleController>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            channel: channel.into(),
            queue,
            controller,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// A job already in progress runs to completion; shutdown is only
    /// observed between jobs.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker_id = %self.worker_id, channel = %self.channel, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                info!(worker_id = %self.worker_id, "Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = sleep(IDLE_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(worker_id = %self.worker_id, "Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(worker_id = %self.worker_id, "Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(worker_id = %self.worker_id, "Worker stopped");
        Ok(())
    }

    /// Claim and process the next item (returns true if one was processed)
    pub async fn process_next_job(&self) -> Result<bool> {
        let item = match self.queue.claim_next(&self.channel, &self.worker_id).await? {
            Some(item) => item,
            None => return Ok(false),
        };

        info!(
            worker_id = %self.worker_id,
            job_id = %item.id(),
            delivery = item.deliveries,
            "Work item claimed"
        );

        let outcome = self.execute_with_heartbeat(&item).await;

        match self.queue.finish(&item.job.job_id, &self.worker_id).await {
            Ok(()) => {}
            Err(AppError::NotFound(_)) => {
                // Redelivered while we were busy; the new owner finishes it
                warn!(
                    worker_id = %self.worker_id,
                    job_id = %item.id(),
                    "Claim lost before finish, leaving item to its current owner"
                );
                return Ok(true);
            }
            Err(e) => return Err(e),
        }
        match &outcome {
            JobOutcome::Completed { .. } => info!(job_id = %item.id(), "Work item done"),
            JobOutcome::Failed { reason } => {
                info!(job_id = %item.id(), reason = %reason, "Work item done (job failed)")
            }
        }
        Ok(true)
    }

    /// Run the controller while refreshing the claim's heartbeat
    async fn execute_with_heartbeat(&self, item: &WorkItem) -> JobOutcome {
        let execution = self.controller.execute(&item.job);
        tokio::pin!(execution);

        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately; the claim itself counts as the first beat
        ticker.tick().await;

        loop {
            tokio::select! {
                outcome = &mut execution => return outcome,
                _ = ticker.tick() => {
                    if let Err(e) = self.queue.heartbeat(&item.job.job_id, &self.worker_id).await {
                        warn!(job_id = %item.id(), error = %e, "Heartbeat failed");
                    }
                }
            }
        }
    }
}
