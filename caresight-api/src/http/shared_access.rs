//! Shared-access grant management endpoints
//!
//! REST API for customers (and admins) to manage which caregivers can see
//! their monitoring data, plus a self-check endpoint for caregivers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use caresight_core::{
    models::{AccessGrant, Requester, UserId},
    service::TargetSources,
    SharedAccessDenial, SharedPermissions,
};

use crate::http::error::{AppError, AppResult};
use crate::http::middleware::AuthRequester;
use crate::http::AppState;

/// Grant representation on the wire
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResponse {
    pub customer_id: String,
    pub caregiver_id: String,
    pub permissions: SharedPermissions,
    pub granted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccessGrant> for GrantResponse {
    fn from(grant: AccessGrant) -> Self {
        Self {
            customer_id: grant.customer_id.0,
            caregiver_id: grant.caregiver_id.0,
            permissions: grant.permissions,
            granted_at: grant.granted_at,
            updated_at: grant.updated_at,
        }
    }
}

/// Query parameters for the access self-check
#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub customer_id: Option<String>,
    pub permission: Option<String>,
}

/// Access self-check result
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_checked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<SharedAccessDenial>,
}

/// GET /api/shared-access/{customer_id}/{caregiver_id} - Fetch the grant
pub async fn get_grant(
    auth: AuthRequester,
    Path((customer_id, caregiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> AppResult<Json<GrantResponse>> {
    let customer_id = UserId::from_string(customer_id);
    let caregiver_id = UserId::from_string(caregiver_id);
    require_pair_member(&auth.requester, &customer_id, &caregiver_id)?;

    let grant = state
        .grants
        .get(&customer_id, &caregiver_id)
        .await?
        .ok_or_else(|| AppError::not_found("No active grant for this pair"))?;

    Ok(Json(grant.into()))
}

/// PUT /api/shared-access/{customer_id}/{caregiver_id} - Create or replace
/// the shared permission map
pub async fn put_grant(
    auth: AuthRequester,
    Path((customer_id, caregiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(permissions): Json<Value>,
) -> AppResult<Json<GrantResponse>> {
    let customer_id = UserId::from_string(customer_id);
    let caregiver_id = UserId::from_string(caregiver_id);
    require_customer_or_admin(&auth.requester, &customer_id)?;

    let grant = state
        .grants
        .grant(&customer_id, &caregiver_id, &permissions)
        .await?;

    Ok(Json(grant.into()))
}

/// DELETE /api/shared-access/{customer_id}/{caregiver_id} - Revoke
pub async fn revoke_grant(
    auth: AuthRequester,
    Path((customer_id, caregiver_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> AppResult<StatusCode> {
    let customer_id = UserId::from_string(customer_id);
    let caregiver_id = UserId::from_string(caregiver_id);
    require_customer_or_admin(&auth.requester, &customer_id)?;

    let revoked = state.grants.revoke(&customer_id, &caregiver_id).await?;
    if revoked {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("No active grant for this pair"))
    }
}

/// GET /api/shared-access/check - Run the authorization gate without a
/// guarded resource
///
/// Lets caregiver apps probe "would I be allowed?" before rendering a
/// feature. Denials come back as a 200 with `allowed: false` and the
/// remediation payload, so a "no" is not an error for the caller.
pub async fn check_access(
    auth: AuthRequester,
    Query(query): Query<CheckQuery>,
    State(state): State<AppState>,
) -> AppResult<Json<CheckResponse>> {
    let mut sources = TargetSources::new();
    if let Some(customer_id) = &query.customer_id {
        sources = sources.with_query("customer_id", customer_id.clone());
    }

    let result = state
        .gate
        .authorize(Some(&auth.requester), &sources, query.permission.as_deref())
        .await;

    match result {
        Ok(decision) => Ok(Json(CheckResponse {
            allowed: true,
            target_customer_id: decision.target_customer_id.map(|id| id.0),
            permission_checked: decision.permission_checked,
            reason: None,
            denial: None,
        })),
        Err(err) if err.is_denial() => {
            let reason = err.to_string();
            let denial = match err {
                caresight_core::Error::PermissionRequired(denial) => Some(denial),
                _ => None,
            };
            Ok(Json(CheckResponse {
                allowed: false,
                target_customer_id: None,
                permission_checked: None,
                reason: Some(reason),
                denial,
            }))
        }
        Err(err) => Err(err.into()),
    }
}

/// Admin, the customer, or the caregiver named in the pair.
fn require_pair_member(
    requester: &Requester,
    customer_id: &UserId,
    caregiver_id: &UserId,
) -> Result<(), AppError> {
    let allowed = requester.role.is_admin()
        || (requester.role.is_customer() && &requester.id == customer_id)
        || (requester.role.is_caregiver() && &requester.id == caregiver_id);

    if allowed {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "Only the customer, the named caregiver, or an admin may view this grant",
        ))
    }
}

/// Admin or the customer themselves.
fn require_customer_or_admin(requester: &Requester, customer_id: &UserId) -> Result<(), AppError> {
    let allowed =
        requester.role.is_admin() || (requester.role.is_customer() && &requester.id == customer_id);

    if allowed {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "Only the customer or an admin may change this grant",
        ))
    }
}
