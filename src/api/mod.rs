//! Thin HTTP transport over the core: ingestion, query, subscription,
//! health, and metrics (spec.md §6).

mod error;
mod handlers;
mod server;
mod state;
mod types;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig};
pub use state::AppState;
pub use types::{ComponentHealth, HealthResponse, HealthStatus, MetricsResponse};
