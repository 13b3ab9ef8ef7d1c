//! Grant lifecycle service
//!
//! Handles creating, replacing, and revoking shared-access grants. Every
//! write goes through validation and normalization before it reaches the
//! store, and every write invalidates the resolver caches for the pair so
//! the next authorization check sees the new state.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::{
    models::{AccessGrant, UserId},
    permissions,
    repository::GrantStore,
    service::shared_access::SharedAccessService,
    validation::{SubjectIdValidator, Validator},
    Error, Result,
};

/// Grant management service
#[derive(Clone)]
pub struct GrantService {
    store: Arc<dyn GrantStore>,
    resolver: SharedAccessService,
}

impl std::fmt::Debug for GrantService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantService").finish()
    }
}

impl GrantService {
    /// Create a new grant service.
    ///
    /// The resolver is shared with the authorization path so that grant
    /// writes can invalidate its caches.
    pub fn new(store: Arc<dyn GrantStore>, resolver: SharedAccessService) -> Self {
        Self { store, resolver }
    }

    /// Create or replace the permission map shared by a customer with a
    /// caregiver.
    ///
    /// The raw map is validated first; any violations are rejected as
    /// `InvalidInput` listing every problem. The stored map is the
    /// normalized form, so readers never see unnormalized keys or channel
    /// lists.
    pub async fn grant(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
        raw_permissions: &Value,
    ) -> Result<AccessGrant> {
        Self::validate_pair(customer_id, caregiver_id)?;

        let report = permissions::validate(raw_permissions);
        if !report.valid {
            return Err(Error::InvalidInput(report.errors.join("; ")));
        }

        let normalized = permissions::normalize(raw_permissions);
        let grant = self
            .store
            .upsert_grant(customer_id, caregiver_id, &normalized)
            .await?;

        self.resolver.invalidate_pair(customer_id, caregiver_id);

        info!(
            customer_id = customer_id.as_str(),
            caregiver_id = caregiver_id.as_str(),
            permission_count = grant.permissions.len(),
            "Shared access granted"
        );

        Ok(grant)
    }

    /// Revoke the grant for a pair.
    ///
    /// Returns `true` when a live grant existed. The resolver caches are
    /// invalidated whether or not a row was revoked.
    pub async fn revoke(&self, customer_id: &UserId, caregiver_id: &UserId) -> Result<bool> {
        Self::validate_pair(customer_id, caregiver_id)?;

        let revoked = self.store.revoke_grant(customer_id, caregiver_id).await?;
        self.resolver.invalidate_pair(customer_id, caregiver_id);

        if revoked {
            info!(
                customer_id = customer_id.as_str(),
                caregiver_id = caregiver_id.as_str(),
                "Shared access revoked"
            );
        }

        Ok(revoked)
    }

    /// Fetch the live grant for a pair, if any.
    pub async fn get(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<Option<AccessGrant>> {
        Self::validate_pair(customer_id, caregiver_id)?;
        self.store.grant_for_pair(customer_id, caregiver_id).await
    }

    fn validate_pair(customer_id: &UserId, caregiver_id: &UserId) -> Result<()> {
        let mut validator = Validator::new();
        validator
            .validate_field(
                "customer_id",
                SubjectIdValidator::new("customer_id").validate(customer_id.as_str()),
            )
            .validate_field(
                "caregiver_id",
                SubjectIdValidator::new("caregiver_id").validate(caregiver_id.as_str()),
            );
        if customer_id == caregiver_id {
            validator.add_error(
                "caregiver_id",
                "customer and caregiver must be different users",
            );
        }
        validator
            .into_result()
            .map_err(|e| Error::InvalidInput(e.to_string()))
    }
}
