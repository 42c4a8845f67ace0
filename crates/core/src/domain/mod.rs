// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use job::{AnalysisJob, JobId, JobLifecycle, JobStatus, DEFAULT_QUERY};
pub use queue::{ChannelId, QueueState, WorkItem};
