use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;
use crate::permissions::SharedPermissions;

/// One customer-to-caregiver shared-access grant.
///
/// The pair (customer_id, caregiver_id) is unique among live grants;
/// revocation is a soft delete so the audit trail keeps the old map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    pub customer_id: UserId,
    pub caregiver_id: UserId,

    /// Normalized permission map (see `permissions::normalize`)
    pub permissions: SharedPermissions,

    pub granted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessGrant {
    #[must_use]
    pub fn new(customer_id: UserId, caregiver_id: UserId, permissions: SharedPermissions) -> Self {
        let now = Utc::now();
        Self {
            customer_id,
            caregiver_id,
            permissions,
            granted_at: now,
            updated_at: now,
            revoked_at: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}
