// Port Layer - Interfaces for external dependencies

pub mod analysis_pipeline;
pub mod document_fetcher;
pub mod id_provider; // For deterministic testing
pub mod maintenance;
pub mod status_reporter;
pub mod time_provider;
pub mod work_queue;

// Re-exports
pub use analysis_pipeline::{AnalysisError, AnalysisPipeline, AnalysisReport, AnalysisRequest};
pub use document_fetcher::{DocumentFetcher, FetchError, FetchedDocument};
pub use id_provider::IdProvider;
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use status_reporter::{ReportError, StatusReporter};
pub use time_provider::TimeProvider;
pub use work_queue::{EnqueueError, WorkQueue};
