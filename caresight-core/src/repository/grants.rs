use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{AccessGrant, CameraId, EventId, NotificationId, RoomId, SnapshotId, UserId},
    permissions::SharedPermissions,
    Result,
};

/// Source of truth for caregiver assignments and permission grants.
///
/// The resolver and target-identity code consume this seam; the Postgres
/// implementation below is the production backing, tests substitute an
/// in-memory double.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Whether the customer explicitly linked this caregiver to their
    /// account.
    async fn is_caregiver_explicitly_assigned(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<bool>;

    /// Whether the caregiver is assigned to any room belonging to the
    /// customer.
    async fn is_caregiver_assigned_to_patient_by_room(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<bool>;

    /// Whether the caregiver is assigned to this specific room.
    async fn is_caregiver_assigned_to_room(
        &self,
        room_id: &RoomId,
        caregiver_id: &UserId,
    ) -> Result<bool>;

    /// The live grant for a customer/caregiver pair, if any.
    async fn grant_for_pair(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<Option<AccessGrant>>;

    /// Create or replace the grant for a pair. Replacing revives a
    /// revoked grant.
    async fn upsert_grant(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
        permissions: &SharedPermissions,
    ) -> Result<AccessGrant>;

    /// Soft-delete the live grant for a pair. Returns whether one
    /// existed.
    async fn revoke_grant(&self, customer_id: &UserId, caregiver_id: &UserId) -> Result<bool>;

    /// Customer owning the camera that recorded this event.
    async fn resolve_owner_of_event(&self, event_id: &EventId) -> Result<Option<UserId>>;

    /// Customer owning this camera.
    async fn resolve_owner_of_camera(&self, camera_id: &CameraId) -> Result<Option<UserId>>;

    /// Customer owning the camera that produced this snapshot.
    async fn resolve_owner_of_snapshot(&self, snapshot_id: &SnapshotId)
        -> Result<Option<UserId>>;

    /// Customer this notification was addressed to.
    async fn resolve_owner_of_notification(
        &self,
        notification_id: &NotificationId,
    ) -> Result<Option<UserId>>;
}

/// Grant store backed by Postgres
#[derive(Clone)]
pub struct PgGrantStore {
    pool: PgPool,
}

impl PgGrantStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert database row to AccessGrant
    fn row_to_grant(&self, row: PgRow) -> Result<AccessGrant> {
        let permissions: Value = row.try_get("permissions")?;
        let permissions = match permissions {
            Value::Object(map) => SharedPermissions(map),
            _ => SharedPermissions::new(),
        };

        Ok(AccessGrant {
            customer_id: UserId::from_string(row.try_get("customer_id")?),
            caregiver_id: UserId::from_string(row.try_get("caregiver_id")?),
            permissions,
            granted_at: row.try_get("granted_at")?,
            updated_at: row.try_get("updated_at")?,
            revoked_at: row.try_get("revoked_at")?,
        })
    }
}

#[async_trait]
impl GrantStore for PgGrantStore {
    async fn is_caregiver_explicitly_assigned(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (
                SELECT 1 FROM caregiver_assignments
                WHERE customer_id = $1 AND caregiver_id = $2 AND revoked_at IS NULL
             ) AS assigned",
        )
        .bind(customer_id.as_str())
        .bind(caregiver_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("assigned")?)
    }

    async fn is_caregiver_assigned_to_patient_by_room(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (
                SELECT 1
                FROM room_assignments ra
                JOIN rooms r ON ra.room_id = r.id
                WHERE r.customer_id = $1
                  AND ra.caregiver_id = $2
                  AND ra.revoked_at IS NULL
             ) AS assigned",
        )
        .bind(customer_id.as_str())
        .bind(caregiver_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("assigned")?)
    }

    async fn is_caregiver_assigned_to_room(
        &self,
        room_id: &RoomId,
        caregiver_id: &UserId,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (
                SELECT 1 FROM room_assignments
                WHERE room_id = $1 AND caregiver_id = $2 AND revoked_at IS NULL
             ) AS assigned",
        )
        .bind(room_id.as_str())
        .bind(caregiver_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("assigned")?)
    }

    async fn grant_for_pair(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<Option<AccessGrant>> {
        let row = sqlx::query(
            "SELECT customer_id, caregiver_id, permissions,
                    granted_at, updated_at, revoked_at
             FROM access_grants
             WHERE customer_id = $1 AND caregiver_id = $2 AND revoked_at IS NULL",
        )
        .bind(customer_id.as_str())
        .bind(caregiver_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_grant(row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_grant(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
        permissions: &SharedPermissions,
    ) -> Result<AccessGrant> {
        let now = chrono::Utc::now();
        let row = sqlx::query(
            "INSERT INTO access_grants (
                customer_id, caregiver_id, permissions, granted_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $4)
             ON CONFLICT (customer_id, caregiver_id) DO UPDATE
             SET
                permissions = EXCLUDED.permissions,
                updated_at = EXCLUDED.updated_at,
                revoked_at = NULL
             RETURNING
                customer_id, caregiver_id, permissions,
                granted_at, updated_at, revoked_at",
        )
        .bind(customer_id.as_str())
        .bind(caregiver_id.as_str())
        .bind(Value::Object(permissions.0.clone()))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        self.row_to_grant(row)
    }

    async fn revoke_grant(&self, customer_id: &UserId, caregiver_id: &UserId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE access_grants
             SET revoked_at = $3, updated_at = $3
             WHERE customer_id = $1 AND caregiver_id = $2 AND revoked_at IS NULL",
        )
        .bind(customer_id.as_str())
        .bind(caregiver_id.as_str())
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn resolve_owner_of_event(&self, event_id: &EventId) -> Result<Option<UserId>> {
        let row = sqlx::query(
            "SELECT c.customer_id
             FROM events e
             JOIN cameras c ON e.camera_id = c.id
             WHERE e.id = $1",
        )
        .bind(event_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(UserId::from_string(row.try_get("customer_id")?))),
            None => Ok(None),
        }
    }

    async fn resolve_owner_of_camera(&self, camera_id: &CameraId) -> Result<Option<UserId>> {
        let row = sqlx::query("SELECT customer_id FROM cameras WHERE id = $1")
            .bind(camera_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(UserId::from_string(row.try_get("customer_id")?))),
            None => Ok(None),
        }
    }

    async fn resolve_owner_of_snapshot(
        &self,
        snapshot_id: &SnapshotId,
    ) -> Result<Option<UserId>> {
        let row = sqlx::query(
            "SELECT c.customer_id
             FROM snapshots s
             JOIN cameras c ON s.camera_id = c.id
             WHERE s.id = $1",
        )
        .bind(snapshot_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(UserId::from_string(row.try_get("customer_id")?))),
            None => Ok(None),
        }
    }

    async fn resolve_owner_of_notification(
        &self,
        notification_id: &NotificationId,
    ) -> Result<Option<UserId>> {
        let row = sqlx::query("SELECT user_id FROM notifications WHERE id = $1")
            .bind(notification_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(UserId::from_string(row.try_get("user_id")?))),
            None => Ok(None),
        }
    }
}
