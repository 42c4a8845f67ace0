//! HTTP Server
//!
//! axum router with fully open CORS, served until the shutdown future resolves.

use crate::handler::{analyze, health, AppState};
use axum::routing::{get, post};
use axum::Router;
use findoc_core::application::IntakeService;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Build the application router
pub fn router(intake: Arc<IntakeService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/analyze", post(analyze))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { intake })
}

/// HTTP Server
pub struct ApiServer {
    config: ApiServerConfig,
    intake: Arc<IntakeService>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, intake: Arc<IntakeService>) -> Self {
        Self { config, intake }
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local: SocketAddr = listener.local_addr()?;

        info!(
            addr = %local,
            channel = %self.intake.channel(),
            "HTTP intake listening"
        );

        axum::serve(listener, router(self.intake))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP intake stopped");
        Ok(())
    }
}
