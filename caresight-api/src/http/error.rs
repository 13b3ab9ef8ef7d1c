// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use caresight_core::SharedAccessDenial;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Remediation payload for shared-access denials. When present the
    /// response body is this payload instead of the generic error shape.
    pub denial: Option<SharedAccessDenial>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            denial: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Guided denial: 403 whose body tells the client how to ask for
    /// the missing permission.
    pub fn permission_required(denial: SharedAccessDenial) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: denial.message.clone(),
            denial: Some(denial),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(denial) = self.denial {
            return (self.status, Json(denial)).into_response();
        }

        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert caresight_core errors to HTTP errors
impl From<caresight_core::Error> for AppError {
    fn from(err: caresight_core::Error) -> Self {
        use caresight_core::Error;

        match err {
            Error::Unauthenticated(msg) => AppError::unauthorized(msg),
            Error::AccessDenied(msg) => AppError::forbidden(msg),
            Error::PermissionRequired(denial) => AppError::permission_required(denial),
            Error::NotFound(msg) => AppError::not_found(msg),
            Error::AlreadyExists(msg) => AppError::conflict(msg),
            Error::InvalidInput(msg) => AppError::bad_request(msg),
            Error::Database(e) => {
                tracing::error!("Database error: {}", e);
                AppError::internal_server_error("Database error")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                AppError::internal_server_error("Data processing error")
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                AppError::internal_server_error("Internal server error")
            }
        }
    }
}

/// Convert serde_json errors to HTTP errors
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::bad_request(format!("JSON error: {err}"))
    }
}

/// Convert anyhow errors to HTTP errors
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {}", err);
        AppError::internal_server_error("Internal server error")
    }
}
