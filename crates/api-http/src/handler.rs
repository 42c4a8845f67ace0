//! HTTP Handlers

use crate::error::ApiError;
use crate::types::{HealthResponse, SubmitReceipt, SubmitRequest};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Json;
use findoc_core::application::IntakeService;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<IntakeService>,
}

/// POST /analyze
///
/// The body is parsed as JSON whatever the content type says.
pub async fn analyze(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SubmitReceipt>, ApiError> {
    let req: SubmitRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("Invalid JSON body: {}", e)))?;

    let receipt = state.intake.submit(req).await?;
    Ok(Json(receipt))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: findoc_core::VERSION,
    })
}
