//! Shared-access resolution.
//!
//! Answers "may this caregiver see this customer's data" from two
//! sources: the explicit caregiver link made by the customer, and
//! room-level assignments (a caregiver assigned to a room of the
//! customer's home). An explicit link wins outright; the room overlap is
//! only consulted when no explicit link exists. Resolved answers are
//! cached per pair for a short TTL, so grant writes must call
//! `invalidate_pair`.

use std::sync::Arc;

use crate::{
    cache::TtlCache,
    config::SharedAccessConfig,
    models::{ActorRole, Requester, RoomId, UserId},
    permissions::{normalize, SharedPermissions},
    repository::GrantStore,
    Result,
};

/// Shared-access resolver
///
/// Cheap to clone; clones share the caches and the store handle.
#[derive(Clone)]
pub struct SharedAccessService {
    store: Arc<dyn GrantStore>,
    /// Explicit customer->caregiver link answers, keyed by pair
    explicit_cache: TtlCache<String, bool>,
    /// Combined patient-access answers (explicit or room), keyed by pair
    patient_access_cache: TtlCache<String, bool>,
    /// Per-room assignment answers, keyed by room + caregiver
    room_access_cache: TtlCache<String, bool>,
    /// Normalized permission maps, keyed by pair; `None` means the pair
    /// has access but no grant row (room-overlap caregivers)
    permissions_cache: TtlCache<String, Option<SharedPermissions>>,
}

impl std::fmt::Debug for SharedAccessService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAccessService").finish()
    }
}

impl SharedAccessService {
    #[must_use]
    pub fn new(store: Arc<dyn GrantStore>, config: &SharedAccessConfig) -> Self {
        let ttl = config.cache_ttl();
        let capacity = config.cache_capacity;
        Self {
            store,
            explicit_cache: TtlCache::new(ttl, capacity),
            patient_access_cache: TtlCache::new(ttl, capacity),
            room_access_cache: TtlCache::new(ttl, capacity),
            permissions_cache: TtlCache::new(ttl, capacity),
        }
    }

    #[must_use]
    pub fn with_defaults(store: Arc<dyn GrantStore>) -> Self {
        Self::new(store, &SharedAccessConfig::default())
    }

    /// Generate cache key for a customer/caregiver pair
    fn pair_key(customer_id: &UserId, caregiver_id: &UserId) -> String {
        format!("{}:{}", customer_id.0, caregiver_id.0)
    }

    /// Generate cache key for a room/caregiver pair
    fn room_key(room_id: &RoomId, caregiver_id: &UserId) -> String {
        format!("{}:{}", room_id.0, caregiver_id.0)
    }

    /// Whether the customer explicitly linked this caregiver.
    pub async fn is_assigned(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<bool> {
        let key = Self::pair_key(customer_id, caregiver_id);

        if let Some(assigned) = self.explicit_cache.get(&key) {
            return Ok(assigned);
        }

        let assigned = self
            .store
            .is_caregiver_explicitly_assigned(customer_id, caregiver_id)
            .await?;
        self.explicit_cache.insert(key, assigned);

        Ok(assigned)
    }

    /// Whether the caregiver may access this customer's data at all.
    ///
    /// The explicit link is checked first and a positive answer
    /// short-circuits; the room overlap is only consulted when no
    /// explicit link exists. Both outcomes are cached, negatives
    /// included: a stale negative is corrected by `invalidate_pair` on
    /// the next grant write and bounded by the TTL otherwise.
    pub async fn can_access_patient(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<bool> {
        let key = Self::pair_key(customer_id, caregiver_id);

        if let Some(allowed) = self.patient_access_cache.get(&key) {
            return Ok(allowed);
        }

        let allowed = if self.is_assigned(customer_id, caregiver_id).await? {
            true
        } else {
            tracing::debug!(
                customer_id = %customer_id,
                caregiver_id = %caregiver_id,
                "no explicit link, consulting room assignments"
            );
            self.store
                .is_caregiver_assigned_to_patient_by_room(customer_id, caregiver_id)
                .await?
        };

        self.patient_access_cache.insert(key, allowed);

        Ok(allowed)
    }

    /// Whether the caregiver is assigned to this specific room.
    pub async fn can_access_room(
        &self,
        room_id: &RoomId,
        caregiver_id: &UserId,
    ) -> Result<bool> {
        let key = Self::room_key(room_id, caregiver_id);

        if let Some(allowed) = self.room_access_cache.get(&key) {
            return Ok(allowed);
        }

        let allowed = self
            .store
            .is_caregiver_assigned_to_room(room_id, caregiver_id)
            .await?;
        self.room_access_cache.insert(key, allowed);

        Ok(allowed)
    }

    /// The caregiver's normalized permission map for this customer.
    ///
    /// Gated on `can_access_patient`: without access the grant row is
    /// never consulted and the answer is `None`. With access but no
    /// grant row (a room-overlap caregiver) the answer is also `None`,
    /// since capabilities come only from an explicit grant.
    pub async fn get_shared_permissions(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<Option<SharedPermissions>> {
        if !self.can_access_patient(customer_id, caregiver_id).await? {
            return Ok(None);
        }

        let key = Self::pair_key(customer_id, caregiver_id);

        if let Some(permissions) = self.permissions_cache.get(&key) {
            return Ok(permissions);
        }

        let grant = self.store.grant_for_pair(customer_id, caregiver_id).await?;
        // Normalize on read: rows written before the current rules still
        // come back canonical.
        let permissions =
            grant.map(|g| normalize(&serde_json::Value::Object(g.permissions.0)));

        self.permissions_cache.insert(key, permissions.clone());

        Ok(permissions)
    }

    /// Whether the caregiver holds a boolean capability for this
    /// customer. Either key spelling is accepted.
    pub async fn has_permission(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
        permission: &str,
    ) -> Result<bool> {
        let permissions = self
            .get_shared_permissions(customer_id, caregiver_id)
            .await?;

        Ok(permissions.is_some_and(|p| p.has_boolean_permission(permission)))
    }

    /// Role-aware access decision.
    ///
    /// Admins pass unconditionally, customers only reach their own data,
    /// caregivers go through patient access plus the optional capability
    /// check. Store failures propagate as errors, never as a false.
    pub async fn check_access(
        &self,
        requester: &Requester,
        customer_id: &UserId,
        permission: Option<&str>,
    ) -> Result<bool> {
        match requester.role {
            ActorRole::Admin => Ok(true),
            ActorRole::Customer => Ok(&requester.id == customer_id),
            ActorRole::Caregiver => {
                if !self.can_access_patient(customer_id, &requester.id).await? {
                    return Ok(false);
                }

                match permission {
                    Some(key) => {
                        self.has_permission(customer_id, &requester.id, key).await
                    }
                    None => Ok(true),
                }
            }
        }
    }

    /// Drop every pair-keyed answer for this customer/caregiver pair.
    ///
    /// Called after grant writes, before the write returns. Pure map
    /// removal: cannot fail and never blocks the triggering write.
    pub fn invalidate_pair(&self, customer_id: &UserId, caregiver_id: &UserId) {
        let key = Self::pair_key(customer_id, caregiver_id);
        self.explicit_cache.remove(&key);
        self.patient_access_cache.remove(&key);
        self.permissions_cache.remove(&key);

        tracing::debug!(
            customer_id = %customer_id,
            caregiver_id = %caregiver_id,
            "invalidated shared-access cache entries"
        );
    }

    /// Drop the cached answer for one room/caregiver pair. Called when a
    /// room assignment changes.
    pub fn invalidate_room(&self, room_id: &RoomId, caregiver_id: &UserId) {
        let key = Self::room_key(room_id, caregiver_id);
        self.room_access_cache.remove(&key);
    }

    /// Drop everything. Administrative escape hatch.
    pub fn clear_caches(&self) {
        self.explicit_cache.clear();
        self.patient_access_cache.clear();
        self.room_access_cache.clear();
        self.permissions_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_generation() {
        let customer_id = UserId("cust12345678".to_string());
        let caregiver_id = UserId("care12345678".to_string());
        let key = SharedAccessService::pair_key(&customer_id, &caregiver_id);
        assert_eq!(key, "cust12345678:care12345678");
    }

    #[test]
    fn test_room_key_generation() {
        let room_id = RoomId("room12345678".to_string());
        let caregiver_id = UserId("care12345678".to_string());
        let key = SharedAccessService::room_key(&room_id, &caregiver_id);
        assert_eq!(key, "room12345678:care12345678");
    }
}
