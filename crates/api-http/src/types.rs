//! HTTP Request/Response Types
//!
//! The submit body and receipt are the core intake types; only the extra
//! shapes live here.

use serde::Serialize;

pub use findoc_core::application::intake::{SubmitReceipt, SubmitRequest};

/// GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Body of every error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}
