//! API Error Types
//!
//! Maps application errors to HTTP status codes. Only validation and enqueue
//! failures are expected here; anything else is a 500.

use crate::types::ErrorBody;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use findoc_core::error::AppError;
use tracing::{error, warn};

/// Machine-readable error codes
pub mod code {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const QUEUE_UNAVAILABLE: &str = "queue_unavailable";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: code::VALIDATION_ERROR,
            message: message.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(_) | AppError::Domain(_) | AppError::Serialization(_) => {
                Self::validation(err.to_string())
            }
            AppError::Enqueue(e) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: code::QUEUE_UNAVAILABLE,
                message: e.to_string(),
            },
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: code::INTERNAL_ERROR,
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = %self.message, "Request failed");
        } else {
            warn!(status = self.status.as_u16(), error = %self.message, "Request rejected");
        }

        let body = ErrorBody {
            error: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
