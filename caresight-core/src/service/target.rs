//! Target customer identification.
//!
//! Guarded endpoints are heterogeneous: some carry the customer id
//! outright (in the path, query string or body, under half a dozen
//! historical names), others only carry a resource id (event, camera,
//! snapshot, notification) whose owner has to be looked up. This module
//! turns a request's raw key/value material into "which customer's data
//! is being touched", without ever failing the request itself.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::{
    models::{CameraId, EventId, NotificationId, Requester, SnapshotId, UserId},
    repository::GrantStore,
};

/// Direct customer-id keys, highest priority first. A bare `id`
/// outranks everything; the remaining groups pair the snake_case
/// spelling with its camelCase twin.
const DIRECT_KEY_GROUPS: [&[&str]; 7] = [
    &["id"],
    &["customer_id", "customerId"],
    &["user_id", "userId"],
    &["patient_id", "patientId"],
    &["target_user_id", "targetUserId"],
    &["owner_id", "ownerId"],
    &["account_id", "accountId"],
];

const EVENT_ID_KEYS: [&str; 2] = ["event_id", "eventId"];
const CAMERA_ID_KEYS: [&str; 2] = ["camera_id", "cameraId"];
const SNAPSHOT_ID_KEYS: [&str; 2] = ["snapshot_id", "snapshotId"];
const NOTIFICATION_ID_KEYS: [&str; 2] = ["notification_id", "notificationId"];

/// Raw request material the resolver scans: path parameters, query
/// string, body fields. Values are kept as strings; the API layer
/// flattens JSON body scalars before handing them over.
#[derive(Debug, Clone, Default)]
pub struct TargetSources {
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: HashMap<String, String>,
}

impl TargetSources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Flatten the scalar fields of a JSON body into the body map.
    /// Nested objects and arrays carry no target identity and are
    /// skipped.
    pub fn absorb_json_body(&mut self, body: &Value) {
        let Some(map) = body.as_object() else {
            return;
        };
        for (key, value) in map {
            let flat = match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            };
            if let Some(flat) = flat {
                self.body.insert(key.clone(), flat);
            }
        }
    }

    fn sources(&self) -> [&HashMap<String, String>; 3] {
        [&self.params, &self.query, &self.body]
    }

    /// First non-blank value under any of `keys`, scanning params, then
    /// query, then body. Whitespace-only values are skipped and the scan
    /// continues.
    fn lookup(&self, keys: &[&str]) -> Option<&str> {
        for source in self.sources() {
            for key in keys {
                if let Some(value) = source.get(*key) {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed);
                    }
                }
            }
        }
        None
    }
}

/// Resolves the target customer of a request
#[derive(Clone)]
pub struct TargetIdentityResolver {
    store: Arc<dyn GrantStore>,
}

impl std::fmt::Debug for TargetIdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetIdentityResolver").finish()
    }
}

impl TargetIdentityResolver {
    #[must_use]
    pub fn new(store: Arc<dyn GrantStore>) -> Self {
        Self { store }
    }

    /// Identify the customer whose data this request touches.
    ///
    /// Direct ids win over indirect references; a customer with nothing
    /// identifiable is taken to mean their own account. Indirect lookups
    /// that fail are logged and treated as non-matches, so a broken
    /// reference chain degrades to "target unknown" instead of an error.
    pub async fn resolve(
        &self,
        requester: &Requester,
        sources: &TargetSources,
    ) -> Option<UserId> {
        if let Some(target) = Self::find_direct(sources) {
            return Some(target);
        }

        if let Some(target) = self.resolve_indirect(sources).await {
            return Some(target);
        }

        if requester.role.is_customer() {
            return Some(requester.id.clone());
        }

        None
    }

    /// Scan for a directly supplied customer id. Source-major: every key
    /// group is tried against the path parameters before the query
    /// string is considered, and the body comes last. Needs no store
    /// access, so callers that must not touch the store can use it
    /// directly.
    pub fn find_direct(sources: &TargetSources) -> Option<UserId> {
        for source in sources.sources() {
            for group in DIRECT_KEY_GROUPS {
                for key in group {
                    if let Some(value) = source.get(*key) {
                        let trimmed = value.trim();
                        if !trimmed.is_empty() {
                            return Some(UserId::from(trimmed));
                        }
                    }
                }
            }
        }
        None
    }

    /// Follow indirect references in fixed order: event, camera,
    /// snapshot, notification. Each failed lookup is swallowed and the
    /// chain moves on.
    async fn resolve_indirect(&self, sources: &TargetSources) -> Option<UserId> {
        if let Some(id) = sources.lookup(&EVENT_ID_KEYS) {
            match self.store.resolve_owner_of_event(&EventId::from(id)).await {
                Ok(Some(owner)) => return Some(owner),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        event_id = id,
                        %error,
                        "event owner lookup failed, trying next reference"
                    );
                }
            }
        }

        if let Some(id) = sources.lookup(&CAMERA_ID_KEYS) {
            match self
                .store
                .resolve_owner_of_camera(&CameraId::from(id))
                .await
            {
                Ok(Some(owner)) => return Some(owner),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        camera_id = id,
                        %error,
                        "camera owner lookup failed, trying next reference"
                    );
                }
            }
        }

        if let Some(id) = sources.lookup(&SNAPSHOT_ID_KEYS) {
            match self
                .store
                .resolve_owner_of_snapshot(&SnapshotId::from(id))
                .await
            {
                Ok(Some(owner)) => return Some(owner),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        snapshot_id = id,
                        %error,
                        "snapshot owner lookup failed, trying next reference"
                    );
                }
            }
        }

        if let Some(id) = sources.lookup(&NOTIFICATION_ID_KEYS) {
            match self
                .store
                .resolve_owner_of_notification(&NotificationId::from(id))
                .await
            {
                Ok(Some(owner)) => return Some(owner),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        notification_id = id,
                        %error,
                        "notification owner lookup failed"
                    );
                }
            }
        }

        None
    }
}
