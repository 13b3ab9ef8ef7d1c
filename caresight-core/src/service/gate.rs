//! The shared-access authorization gate.
//!
//! Single policy point in front of every guarded endpoint. Admins pass,
//! customers reach only their own data, caregivers go through the
//! resolver; everything else is a denial, and every denial leaves one
//! audit record. Caregiver denials carry remediation metadata so the
//! client can offer a "request permission" flow instead of a dead end.

use crate::{
    error::SharedAccessDenial,
    models::{ActorRole, Requester, UserId},
    service::{SharedAccessService, TargetIdentityResolver, TargetSources},
    validation::{SubjectIdValidator, Validator},
    Error, Result,
};

use serde::Serialize;

/// Context produced by a successful authorization, for the handler to
/// attach to the request.
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    /// The customer whose data the request touches, when identifiable.
    pub target_customer_id: Option<UserId>,
    /// The capability that was verified, if the route required one.
    pub permission_checked: Option<String>,
}

/// Authorization gate for guarded endpoints
#[derive(Clone)]
pub struct SharedAccessGate {
    resolver: SharedAccessService,
    targets: TargetIdentityResolver,
    /// Rendered into guided denials; clients POST here to ask the
    /// customer for the missing permission.
    request_endpoint: String,
}

impl std::fmt::Debug for SharedAccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAccessGate").finish()
    }
}

impl SharedAccessGate {
    #[must_use]
    pub fn new(
        resolver: SharedAccessService,
        targets: TargetIdentityResolver,
        request_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            targets,
            request_endpoint: request_endpoint.into(),
        }
    }

    /// Decide whether this request may proceed.
    ///
    /// `permission` is the capability the route requires; `None` reduces
    /// the caregiver path to a pure presence check. Store failures
    /// propagate as errors and are never rendered as denials.
    pub async fn authorize(
        &self,
        requester: Option<&Requester>,
        sources: &TargetSources,
        permission: Option<&str>,
    ) -> Result<AccessDecision> {
        let Some(requester) = requester else {
            Self::log_denial(None, None, permission, "missing authenticated user");
            return Err(Error::Unauthenticated(
                "Missing authenticated user".to_string(),
            ));
        };

        match requester.role {
            // Admins pass before any target resolution; the direct key
            // scan still supplies handler context, but no store lookup
            // ever runs on their behalf.
            ActorRole::Admin => Ok(AccessDecision {
                target_customer_id: TargetIdentityResolver::find_direct(sources),
                permission_checked: None,
            }),

            ActorRole::Customer => {
                // Infallible, and falls back to self for customers
                let target = self
                    .targets
                    .resolve(requester, sources)
                    .await
                    .unwrap_or_else(|| requester.id.clone());

                if target == requester.id {
                    return Ok(AccessDecision {
                        target_customer_id: Some(target),
                        permission_checked: None,
                    });
                }

                let reason = "Only caregivers may use shared access";
                Self::log_denial(Some(requester), Some(&target), permission, reason);
                Err(Error::AccessDenied(reason.to_string()))
            }

            ActorRole::Caregiver => {
                // Lookup failures inside degrade to None
                let target = self.targets.resolve(requester, sources).await;

                let Some(customer_id) = target else {
                    Self::log_denial(
                        Some(requester),
                        None,
                        permission,
                        "cannot determine target customer",
                    );
                    return Err(Error::AccessDenied(
                        "Cannot determine the target customer for this request".to_string(),
                    ));
                };

                // Malformed ids are the caller's mistake, not a
                // permission verdict; they surface as bad input.
                Self::validate_identifiers(requester, &customer_id)?;

                self.authorize_caregiver(requester, customer_id, permission)
                    .await
            }
        }
    }

    fn validate_identifiers(requester: &Requester, customer_id: &UserId) -> Result<()> {
        let mut validator = Validator::new();
        validator
            .validate_field(
                "caregiver_id",
                SubjectIdValidator::new("caregiver_id").validate(requester.id.as_str()),
            )
            .validate_field(
                "customer_id",
                SubjectIdValidator::new("customer_id").validate(customer_id.as_str()),
            );
        validator
            .into_result()
            .map_err(|e| Error::InvalidInput(e.to_string()))
    }

    /// Caregiver pathway: patient access, then the optional capability.
    async fn authorize_caregiver(
        &self,
        requester: &Requester,
        customer_id: UserId,
        permission: Option<&str>,
    ) -> Result<AccessDecision> {
        if !self
            .resolver
            .can_access_patient(&customer_id, &requester.id)
            .await?
        {
            return Err(self.guided_denial(
                requester,
                &customer_id,
                permission,
                "This customer has not shared their monitoring data with you",
            ));
        }

        if let Some(key) = permission {
            if !self
                .resolver
                .has_permission(&customer_id, &requester.id, key)
                .await?
            {
                let message =
                    format!("This customer has not shared '{key}' access with you");
                return Err(self.guided_denial(
                    requester,
                    &customer_id,
                    permission,
                    &message,
                ));
            }
        }

        Ok(AccessDecision {
            target_customer_id: Some(customer_id),
            permission_checked: permission.map(str::to_string),
        })
    }

    /// Build, audit-log and return a denial carrying remediation
    /// metadata.
    fn guided_denial(
        &self,
        requester: &Requester,
        customer_id: &UserId,
        permission: Option<&str>,
        message: &str,
    ) -> Error {
        Self::log_denial(Some(requester), Some(customer_id), permission, message);

        Error::PermissionRequired(SharedAccessDenial::request_permission(
            message,
            &self.request_endpoint,
            customer_id.as_str(),
            requester.id.as_str(),
            permission.map(str::to_string),
        ))
    }

    /// One audit record per denial, structured for log search.
    fn log_denial(
        requester: Option<&Requester>,
        target: Option<&UserId>,
        permission: Option<&str>,
        reason: &str,
    ) {
        tracing::warn!(
            requester_id = requester.map_or("-", |r| r.id.as_str()),
            requester_role = requester.map_or("-", |r| r.role.as_str()),
            target_customer_id = target.map_or("-", |t| t.as_str()),
            permission = permission.unwrap_or("-"),
            reason,
            "shared access denied"
        );
    }
}
