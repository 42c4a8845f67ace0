// Intake Service - accepts analysis requests and hands them to the queue

pub mod submit;

pub use submit::{SubmitReceipt, SubmitRequest};

use crate::error::Result;
use crate::port::{IdProvider, TimeProvider, WorkQueue};
use std::sync::Arc;

/// Intake Service
pub struct IntakeService {
    queue: Arc<dyn WorkQueue>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    channel: String,
}

impl IntakeService {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            id_provider,
            time_provider,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Enqueue a new analysis job; returns as soon as the queue acknowledged it
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitReceipt> {
        submit::execute(
            self.queue.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            &self.channel,
            req,
        )
        .await
    }
}
