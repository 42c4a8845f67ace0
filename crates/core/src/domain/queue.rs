// Work Queue Domain Model

use crate::domain::job::AnalysisJob;
use serde::{Deserialize, Serialize};

/// Queue channel identifier
pub type ChannelId = String;

/// Delivery state of a work item inside the durable queue
///
/// This is queue bookkeeping only. The user-visible job status lives in the
/// record store (see `JobStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueState {
    Queued,
    Claimed,
    Done,
    Dead,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Queued => "QUEUED",
            QueueState::Claimed => "CLAIMED",
            QueueState::Done => "DONE",
            QueueState::Dead => "DEAD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(QueueState::Queued),
            "CLAIMED" => Some(QueueState::Claimed),
            "DONE" => Some(QueueState::Done),
            "DEAD" => Some(QueueState::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work on the durable queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub job: AnalysisJob,
    pub channel: ChannelId,
    pub state: QueueState,

    /// Number of times the item was handed to a worker
    pub deliveries: i32,

    pub enqueued_at: i64, // epoch ms
    pub claimed_at: Option<i64>,
    pub claimed_by: Option<String>,
    pub heartbeat_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub last_error: Option<String>,
}

impl WorkItem {
    /// Create a freshly enqueued item
    pub fn new(job: AnalysisJob, channel: impl Into<String>, enqueued_at: i64) -> Self {
        Self {
            job,
            channel: channel.into(),
            state: QueueState::Queued,
            deliveries: 0,
            enqueued_at,
            claimed_at: None,
            claimed_by: None,
            heartbeat_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.job.job_id
    }

    /// Last sign of life from the owning worker (heartbeat, else claim time)
    pub fn last_seen_at(&self) -> Option<i64> {
        self.heartbeat_at.or(self.claimed_at)
    }
}
