use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remediation payload attached to a shared-access denial.
///
/// Clients render `message` and, when `action` is `request_permission`,
/// offer a one-tap flow that POSTs to `endpoint` asking the customer to
/// grant the missing permission. Field names are part of the wire contract
/// consumed by the mobile apps, hence the camelCase rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedAccessDenial {
    pub message: String,
    pub action: String,
    pub endpoint: String,
    pub customer_id: String,
    pub caregiver_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_key: Option<String>,
}

impl SharedAccessDenial {
    pub const ACTION_REQUEST_PERMISSION: &'static str = "request_permission";

    pub fn request_permission(
        message: impl Into<String>,
        endpoint: impl Into<String>,
        customer_id: impl Into<String>,
        caregiver_id: impl Into<String>,
        permission_key: Option<String>,
    ) -> Self {
        Self {
            message: message.into(),
            action: Self::ACTION_REQUEST_PERMISSION.to_string(),
            endpoint: endpoint.into(),
            customer_id: customer_id.into(),
            caregiver_id: caregiver_id.into(),
            permission_key,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Denial that carries remediation metadata for the client.
    #[error("{}", .0.message)]
    PermissionRequired(SharedAccessDenial),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error represents a policy decision (as opposed to an
    /// upstream failure). Store and serialization errors are never
    /// rendered as denials.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::AccessDenied(_) | Self::PermissionRequired(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // Map "no rows" to NotFound
            sqlx::Error::RowNotFound => Self::NotFound("Resource not found".to_string()),
            // Map constraint violations to client-facing variants
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                match code.as_ref() {
                    // PostgreSQL unique_violation
                    "23505" => Self::AlreadyExists("Resource already exists".to_string()),
                    // PostgreSQL foreign_key_violation
                    "23503" => Self::NotFound("Referenced resource not found".to_string()),
                    // PostgreSQL check_violation
                    "23514" => Self::InvalidInput("Constraint check failed".to_string()),
                    // PostgreSQL not_null_violation
                    "23502" => Self::InvalidInput("Required field is missing".to_string()),
                    _ => Self::Database(err),
                }
            }
            _ => Self::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
