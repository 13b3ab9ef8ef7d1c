//! Health check endpoints
//!
//! Provides liveness and readiness checks for monitoring probes.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};

use crate::http::{AppError, AppResult, AppState};

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

/// Basic health check (always returns OK if server is running)
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

/// Readiness check: probes the database when the server runs with one,
/// so load balancers stop routing to an instance that lost its pool.
pub async fn readiness_check(State(state): State<AppState>) -> AppResult<&'static str> {
    if let Some(pool) = &state.pool {
        sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
            tracing::error!("Readiness check failed: {}", e);
            AppError::new(StatusCode::SERVICE_UNAVAILABLE, "Database unreachable")
        })?;
    }
    Ok("OK")
}
