// Submit Use Case

use crate::domain::{AnalysisJob, DomainError, JobStatus, WorkItem};
use crate::error::Result;
use crate::port::{IdProvider, TimeProvider, WorkQueue};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

/// Submit request
///
/// Every field is optional on the wire so that a missing id can be reported
/// as a validation error instead of a parse failure. Ids are opaque: any
/// JSON scalar is accepted and kept as its text (`42` becomes `"42"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default, deserialize_with = "scalar_id")]
    pub chat_id: Option<String>,
    #[serde(default, deserialize_with = "scalar_id")]
    pub file_id: Option<String>,
    #[serde(default, deserialize_with = "scalar_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

fn scalar_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "id must be a string or number, got {}",
            other
        ))),
    }
}

/// Acknowledgement returned once the queue accepted the work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub status: JobStatus,
    pub job_id: String,
}

impl SubmitRequest {
    /// Build the job, checking presence of the required ids (no format validation)
    pub fn into_job(self, job_id: impl Into<String>) -> std::result::Result<AnalysisJob, DomainError> {
        let chat_id = self.chat_id.ok_or(DomainError::MissingField("chat_id"))?;
        let file_id = self.file_id.ok_or(DomainError::MissingField("file_id"))?;
        Ok(AnalysisJob::new(job_id, chat_id, file_id, self.user_id, self.query))
    }
}

/// Execute submit use case
///
/// # Arguments
///
/// * `queue` - Durable work queue
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `channel` - Queue channel the worker listens on
/// * `req` - Submit request
pub async fn execute(
    queue: &dyn WorkQueue,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    channel: &str,
    req: SubmitRequest,
) -> Result<SubmitReceipt> {
    let job_id = id_provider.generate_id();
    let job = req.into_job(job_id.clone())?;
    let item = WorkItem::new(job, channel, time_provider.now_millis());

    // Surfaces to the caller: never report "queued" for an item the queue refused
    queue.enqueue(&item).await?;

    info!(
        job_id = %job_id,
        chat_id = %item.job.chat_id,
        file_id = %item.job.file_id,
        channel = %channel,
        "Analysis job queued"
    );

    Ok(SubmitReceipt {
        status: JobStatus::Queued,
        job_id,
    })
}

#[cfg(test)]
#[path = "submit_test.rs"]
mod submit_test;
