//! Guarded monitoring-resource endpoints
//!
//! Each route runs the shared-access gate with the capability it
//! requires before anything else happens. Handlers respond with the
//! authorization context; serving the actual stream/event/snapshot
//! payload belongs to the media and event services behind this gate.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use caresight_core::service::TargetSources;

use crate::http::error::AppResult;
use crate::http::middleware::AuthRequester;
use crate::http::AppState;

/// Permission required to view live streams and snapshots
pub const STREAM_VIEW: &str = "stream:view";
/// Permission required to read alert events and notifications
pub const ALERT_READ: &str = "alert:read";
/// Permission required to acknowledge alert events
pub const ALERT_ACK: &str = "alert:ack";
/// Permission required to view the customer profile
pub const PROFILE_VIEW: &str = "profile:view";

/// Authorization context returned by guarded routes
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedResource {
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_checked: Option<String>,
}

async fn authorize_resource(
    state: &AppState,
    auth: &AuthRequester,
    key: &'static str,
    resource_id: String,
    permission: Option<&str>,
) -> AppResult<Json<AuthorizedResource>> {
    let sources = TargetSources::new().with_param(key, resource_id.clone());
    let decision = state
        .gate
        .authorize(Some(&auth.requester), &sources, permission)
        .await?;

    Ok(Json(AuthorizedResource {
        resource_id,
        target_customer_id: decision.target_customer_id.map(|id| id.0),
        permission_checked: decision.permission_checked,
    }))
}

/// GET /api/cameras/{camera_id}/stream - Live stream access
pub async fn camera_stream(
    auth: AuthRequester,
    Path(camera_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<AuthorizedResource>> {
    authorize_resource(&state, &auth, "camera_id", camera_id, Some(STREAM_VIEW)).await
}

/// GET /api/events/{event_id} - Alert event detail
pub async fn get_event(
    auth: AuthRequester,
    Path(event_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<AuthorizedResource>> {
    authorize_resource(&state, &auth, "event_id", event_id, Some(ALERT_READ)).await
}

/// POST /api/events/{event_id}/ack - Acknowledge an alert event
pub async fn ack_event(
    auth: AuthRequester,
    Path(event_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<AuthorizedResource>> {
    authorize_resource(&state, &auth, "event_id", event_id, Some(ALERT_ACK)).await
}

/// GET /api/snapshots/{snapshot_id} - Snapshot access
pub async fn get_snapshot(
    auth: AuthRequester,
    Path(snapshot_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<AuthorizedResource>> {
    authorize_resource(&state, &auth, "snapshot_id", snapshot_id, Some(STREAM_VIEW)).await
}

/// GET /api/notifications/{notification_id} - Notification detail
pub async fn get_notification(
    auth: AuthRequester,
    Path(notification_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<AuthorizedResource>> {
    authorize_resource(
        &state,
        &auth,
        "notification_id",
        notification_id,
        Some(ALERT_READ),
    )
    .await
}

/// GET /api/customers/{customer_id}/profile - Customer profile
pub async fn customer_profile(
    auth: AuthRequester,
    Path(customer_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<AuthorizedResource>> {
    authorize_resource(&state, &auth, "customer_id", customer_id, Some(PROFILE_VIEW)).await
}
