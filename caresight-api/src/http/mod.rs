// Module: http
// HTTP/JSON REST API in front of the shared-access services

pub mod error;
pub mod guarded;
pub mod health;
pub mod middleware;
pub mod shared_access;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use caresight_core::{
    config::SharedAccessConfig,
    repository::GrantStore,
    service::{GrantService, SharedAccessGate, SharedAccessService, TargetIdentityResolver},
};

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub grants: GrantService,
    pub gate: SharedAccessGate,
    /// Present when the server runs against Postgres; the readiness
    /// probe pings it. Tests pass `None`.
    pub pool: Option<sqlx::PgPool>,
}

/// Create the HTTP router with all routes
pub fn create_router(
    store: Arc<dyn GrantStore>,
    config: &SharedAccessConfig,
    pool: Option<sqlx::PgPool>,
) -> axum::Router {
    let resolver = SharedAccessService::new(store.clone(), config);
    let targets = TargetIdentityResolver::new(store.clone());
    let gate = SharedAccessGate::new(
        resolver.clone(),
        targets,
        config.request_endpoint.clone(),
    );
    let grants = GrantService::new(store, resolver);

    let state = AppState { grants, gate, pool };

    let router = Router::new()
        // Health check endpoints (for monitoring probes)
        .merge(health::create_health_router())
        // Grant management
        .route(
            "/api/shared-access/check",
            get(shared_access::check_access),
        )
        .route(
            "/api/shared-access/{customer_id}/{caregiver_id}",
            get(shared_access::get_grant),
        )
        .route(
            "/api/shared-access/{customer_id}/{caregiver_id}",
            axum::routing::put(shared_access::put_grant),
        )
        .route(
            "/api/shared-access/{customer_id}/{caregiver_id}",
            axum::routing::delete(shared_access::revoke_grant),
        )
        // Guarded monitoring resources
        .route("/api/cameras/{camera_id}/stream", get(guarded::camera_stream))
        .route("/api/events/{event_id}", get(guarded::get_event))
        .route("/api/events/{event_id}/ack", post(guarded::ack_event))
        .route("/api/snapshots/{snapshot_id}", get(guarded::get_snapshot))
        .route(
            "/api/notifications/{notification_id}",
            get(guarded::get_notification),
        )
        .route(
            "/api/customers/{customer_id}/profile",
            get(guarded::customer_profile),
        );

    // Apply layers before state
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Apply state to all routes (must be last)
    router.with_state(state)
}
