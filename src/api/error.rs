//! Maps the core error taxonomy onto HTTP status codes (spec.md §7).
//!
//! Grounded on the teacher's `api/rest/types.rs` `ApiError`/`IntoResponse`
//! pattern: a structured JSON error body with a stable `code`, narrowed to
//! the kinds `HeimdallError` actually has instead of a free-form code
//! string.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::HeimdallError;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

impl From<HeimdallError> for ApiError {
    fn from(e: HeimdallError) -> Self {
        let code = match &e {
            HeimdallError::Validation(_) => "VALIDATION_ERROR",
            HeimdallError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            HeimdallError::CircuitOpen(_) => "DEPENDENCY_UNAVAILABLE",
            HeimdallError::DependencyUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
            HeimdallError::Overloaded(_) => "OVERLOADED",
            HeimdallError::NotFound(_) => "NOT_FOUND",
            HeimdallError::Conflict(_) => "CONFLICT",
            HeimdallError::AcquireTimeout(_) | HeimdallError::Timeout(_) => "TIMEOUT",
            HeimdallError::PoolClosed => "OVERLOADED",
            HeimdallError::Configuration(_) => "INTERNAL",
            HeimdallError::Io(_) | HeimdallError::Serialization(_) | HeimdallError::Internal(_) => "INTERNAL",
        };
        Self { code, message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.code {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "DEPENDENCY_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            "STORAGE_UNAVAILABLE" | "TIMEOUT" => StatusCode::GATEWAY_TIMEOUT,
            "OVERLOADED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
