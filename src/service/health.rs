//! Liveness and readiness endpoints.

use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Handle GET /health - Basic health check.
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Handle GET /ready - Readiness check.
pub async fn ready_handler() -> impl IntoResponse {
    (StatusCode::OK, "READY")
}
