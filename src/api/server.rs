//! HTTP server setup: router assembly and bind/serve loop.
//!
//! Grounded on the teacher's `RestApiServer` (`api/rest/server.rs`): same
//! `ApiConfig`-driven constructor plus `tower_http` CORS/trace/timeout
//! layers, narrowed to the routes this crate actually exposes.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::{HeimdallError, Result};

use super::handlers;
use super::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiServerConfig {
    pub listen_addr: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, mut state: AppState) -> Self {
        state.started_at = std::sync::Arc::new(Instant::now());
        Self { config, state }
    }

    fn build_router(&self) -> Router {
        Router::new()
            .route("/v1/ingest", post(handlers::ingest))
            .route("/v1/ingest/batch", post(handlers::ingest_batch))
            .route("/v1/query", post(handlers::query))
            .route("/v1/subscribe", get(handlers::subscribe))
            .route("/v1/health", get(handlers::health))
            .route("/v1/metrics", get(handlers::metrics))
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(self.config.request_timeout))
            .with_state(self.state.clone())
    }

    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.listen_addr, self.config.port)
            .parse()
            .map_err(|e| HeimdallError::Configuration(format!("invalid listen address: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(HeimdallError::Io)?;
        tracing::info!(%addr, "API server listening");
        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| HeimdallError::Internal(format!("server error: {e}")))
    }
}
