// Maintenance Service
// Periodic redelivery sweep plus queue database housekeeping

use crate::application::recovery::RedeliveryService;
use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::{Maintenance, MaintenanceConfig, MaintenanceStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Maintenance scheduler
///
/// Each tick: redeliver stale claims, purge old finished items, VACUUM when
/// the database outgrew its limit.
pub struct MaintenanceScheduler {
    maintenance: Arc<dyn Maintenance>,
    redelivery: Arc<RedeliveryService>,
    config: MaintenanceConfig,
    period: Duration,
}

impl MaintenanceScheduler {
    /// Create a new maintenance scheduler
    ///
    /// # Arguments
    /// * `maintenance` - Queue maintenance implementation
    /// * `redelivery` - Stale claim sweeper
    /// * `config` - Retention and size limits
    /// * `period` - How often to run
    pub fn new(
        maintenance: Arc<dyn Maintenance>,
        redelivery: Arc<RedeliveryService>,
        config: MaintenanceConfig,
        period: Duration,
    ) -> Self {
        Self {
            maintenance,
            redelivery,
            config,
            period,
        }
    }

    /// Run maintenance loop until shutdown (spawn with tokio::spawn)
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            period_secs = self.period.as_secs(),
            retention_days = self.config.finished_item_retention_days,
            "Maintenance scheduler started"
        );

        let mut tick = interval(self.period);

        loop {
            tokio::select! {
                _ = tick.tick() => {},
                _ = shutdown.wait() => {
                    info!("Maintenance scheduler stopped");
                    return;
                }
            }

            if let Err(e) = self.run_now().await {
                error!(error = %e, "Scheduled maintenance failed");
            }
        }
    }

    /// Run one maintenance pass immediately
    pub async fn run_now(&self) -> Result<MaintenanceStats> {
        let redelivered = self.redelivery.redeliver_stale().await?;
        let stats = self.maintenance.run_full_maintenance(&self.config).await?;

        info!(
            requeued = redelivered.requeued,
            buried = redelivered.buried,
            db_size_mb = stats.db_size_mb,
            item_count = stats.item_count,
            finished_items = stats.finished_item_count,
            "Maintenance pass completed"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisJob, QueueState, WorkItem};
    use crate::port::status_reporter::mocks::MockStatusReporter;
    use crate::port::time_provider::FixedTimeProvider;
    use crate::port::work_queue::mocks::MockWorkQueue;
    use crate::port::WorkQueue;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMaintenance {
        purges: Mutex<Vec<i64>>,
        vacuums: Mutex<usize>,
        size_mb: f64,
    }

    #[async_trait]
    impl Maintenance for RecordingMaintenance {
        async fn vacuum(&self) -> Result<f64> {
            *self.vacuums.lock().unwrap() += 1;
            Ok(1.0)
        }

        async fn purge_finished(&self, retention_days: i64) -> Result<i64> {
            self.purges.lock().unwrap().push(retention_days);
            Ok(0)
        }

        async fn get_stats(&self) -> Result<MaintenanceStats> {
            Ok(MaintenanceStats {
                db_size_mb: self.size_mb,
                ..Default::default()
            })
        }
    }

    fn scheduler(
        maintenance: Arc<RecordingMaintenance>,
        queue: Arc<MockWorkQueue>,
    ) -> MaintenanceScheduler {
        let redelivery = Arc::new(RedeliveryService::new(
            queue,
            Arc::new(MockStatusReporter::new()),
            Arc::new(FixedTimeProvider::new(1_000_000)),
            Some(1_000),
            Some(3),
        ));
        MaintenanceScheduler::new(
            maintenance,
            redelivery,
            MaintenanceConfig::default(),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_run_now_redelivers_and_purges() {
        let maintenance = Arc::new(RecordingMaintenance::default());
        let queue = Arc::new(MockWorkQueue::new());
        let job = AnalysisJob::new_test("c1", "f1");
        let id = job.job_id.clone();
        queue
            .enqueue(&WorkItem::new(job, "financial_analysis", 0))
            .await
            .unwrap();
        queue.claim_next("financial_analysis", "gone").await.unwrap();

        scheduler(maintenance.clone(), queue.clone())
            .run_now()
            .await
            .unwrap();

        assert_eq!(*maintenance.purges.lock().unwrap(), vec![7]);
        assert_eq!(*maintenance.vacuums.lock().unwrap(), 0);
        assert_eq!(
            queue.find_by_id(&id).await.unwrap().unwrap().state,
            QueueState::Queued
        );
    }

    #[tokio::test]
    async fn test_vacuum_only_above_size_limit() {
        let maintenance = Arc::new(RecordingMaintenance {
            size_mb: 1024.0,
            ..Default::default()
        });

        scheduler(maintenance.clone(), Arc::new(MockWorkQueue::new()))
            .run_now()
            .await
            .unwrap();

        assert_eq!(*maintenance.vacuums.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let maintenance = Arc::new(RecordingMaintenance::default());
        let s = scheduler(maintenance.clone(), Arc::new(MockWorkQueue::new()));
        let (sender, token) = crate::application::worker::shutdown_channel();

        let handle = tokio::spawn(s.run(token));
        sender.shutdown();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
