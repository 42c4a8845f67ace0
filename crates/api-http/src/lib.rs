//! Findoc HTTP API
//!
//! `POST /analyze` hands a job to the durable queue; `GET /health` is a
//! liveness check.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use server::{router, ApiServer, ApiServerConfig};
