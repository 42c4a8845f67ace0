// Findoc Infrastructure - System Adapters
// Implements: AnalysisPipeline (child process per job), document tools

pub mod document_tools;
pub mod subprocess_pipeline;

pub use document_tools::{assess_financial_risk, condense_financial_data, read_financial_document};
pub use subprocess_pipeline::{PipelineSettings, SubprocessPipeline};
