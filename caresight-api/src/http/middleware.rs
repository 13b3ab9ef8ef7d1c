// HTTP middleware

use axum::{
    extract::FromRequestParts,
    http::{header::HeaderMap, request::Parts},
};
use caresight_core::models::{ActorRole, Requester, UserId};

use super::AppError;

/// Trusted gateway header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-auth-user-id";
/// Trusted gateway header carrying the authenticated user's role.
pub const ROLE_HEADER: &str = "x-auth-role";

/// Authenticated requester extracted from the trusted gateway headers.
///
/// Authentication itself happens upstream; by the time a request reaches
/// this service the gateway has already verified the session and stamped
/// these headers. Absent or malformed headers reject with 401.
#[derive(Debug, Clone)]
pub struct AuthRequester {
    pub requester: Requester,
}

impl AuthRequester {
    fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("Missing x-auth-user-id header"))?
            .to_str()
            .map_err(|_| AppError::unauthorized("Invalid x-auth-user-id header"))?
            .trim();

        if user_id.is_empty() {
            return Err(AppError::unauthorized("Empty x-auth-user-id header"));
        }

        let role = headers
            .get(ROLE_HEADER)
            .ok_or_else(|| AppError::unauthorized("Missing x-auth-role header"))?
            .to_str()
            .map_err(|_| AppError::unauthorized("Invalid x-auth-role header"))?;

        // Unknown role strings are rejected here, so the gate only ever
        // sees the three known roles
        let role: ActorRole = role
            .parse()
            .map_err(|_| AppError::unauthorized(format!("Unknown role '{role}'")))?;

        Ok(Self {
            requester: Requester::new(UserId::from(user_id), role),
        })
    }
}

impl<S> FromRequestParts<S> for AuthRequester
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
