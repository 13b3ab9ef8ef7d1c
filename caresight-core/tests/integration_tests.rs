//! Integration tests for caresight-core services
//!
//! These tests drive the resolver, target resolution, authorization gate,
//! and grant lifecycle against an in-memory grant store, verifying caching
//! and invalidation behavior end to end.
//!
//! Run with: cargo test --test integration_tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use caresight_core::{
    config::SharedAccessConfig,
    models::{AccessGrant, CameraId, EventId, NotificationId, Requester, RoomId, SnapshotId, UserId},
    permissions::SharedPermissions,
    repository::GrantStore,
    service::{GrantService, SharedAccessGate, SharedAccessService, TargetIdentityResolver, TargetSources},
    Error, Result,
};

type Pair = (String, String);

/// In-memory grant store with per-method call counters and failure
/// injection, so tests can assert what the resolver actually hit.
#[derive(Default)]
struct MockGrantStore {
    explicit_pairs: Mutex<HashSet<Pair>>,
    room_overlap_pairs: Mutex<HashSet<Pair>>,
    room_assignments: Mutex<HashSet<Pair>>,
    grants: Mutex<HashMap<Pair, AccessGrant>>,
    event_owners: Mutex<HashMap<String, String>>,
    camera_owners: Mutex<HashMap<String, String>>,
    snapshot_owners: Mutex<HashMap<String, String>>,
    notification_owners: Mutex<HashMap<String, String>>,

    fail_explicit: AtomicBool,
    fail_event_lookups: AtomicBool,

    explicit_calls: AtomicUsize,
    room_calls: AtomicUsize,
    grant_calls: AtomicUsize,
    event_lookup_calls: AtomicUsize,
    camera_lookup_calls: AtomicUsize,
}

impl MockGrantStore {
    fn new() -> Self {
        Self::default()
    }

    fn with_explicit(self, customer: &str, caregiver: &str) -> Self {
        self.explicit_pairs
            .lock()
            .insert((customer.to_string(), caregiver.to_string()));
        self
    }

    fn with_room_overlap(self, customer: &str, caregiver: &str) -> Self {
        self.room_overlap_pairs
            .lock()
            .insert((customer.to_string(), caregiver.to_string()));
        self
    }

    fn with_raw_grant(self, customer: &str, caregiver: &str, permissions: serde_json::Value) -> Self {
        let map = match permissions {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let grant = AccessGrant::new(
            UserId::from(customer),
            UserId::from(caregiver),
            SharedPermissions(map),
        );
        self.grants
            .lock()
            .insert((customer.to_string(), caregiver.to_string()), grant);
        self
    }

    fn with_event_owner(self, event: &str, customer: &str) -> Self {
        self.event_owners
            .lock()
            .insert(event.to_string(), customer.to_string());
        self
    }

    fn with_camera_owner(self, camera: &str, customer: &str) -> Self {
        self.camera_owners
            .lock()
            .insert(camera.to_string(), customer.to_string());
        self
    }

    fn with_notification_owner(self, notification: &str, customer: &str) -> Self {
        self.notification_owners
            .lock()
            .insert(notification.to_string(), customer.to_string());
        self
    }

    fn explicit_calls(&self) -> usize {
        self.explicit_calls.load(Ordering::SeqCst)
    }

    fn room_calls(&self) -> usize {
        self.room_calls.load(Ordering::SeqCst)
    }

    fn grant_calls(&self) -> usize {
        self.grant_calls.load(Ordering::SeqCst)
    }

    fn injected_failure() -> Error {
        Error::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl GrantStore for MockGrantStore {
    async fn is_caregiver_explicitly_assigned(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<bool> {
        self.explicit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_explicit.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        Ok(self
            .explicit_pairs
            .lock()
            .contains(&(customer_id.as_str().to_string(), caregiver_id.as_str().to_string())))
    }

    async fn is_caregiver_assigned_to_patient_by_room(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<bool> {
        self.room_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .room_overlap_pairs
            .lock()
            .contains(&(customer_id.as_str().to_string(), caregiver_id.as_str().to_string())))
    }

    async fn is_caregiver_assigned_to_room(
        &self,
        room_id: &RoomId,
        caregiver_id: &UserId,
    ) -> Result<bool> {
        Ok(self
            .room_assignments
            .lock()
            .contains(&(room_id.as_str().to_string(), caregiver_id.as_str().to_string())))
    }

    async fn grant_for_pair(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
    ) -> Result<Option<AccessGrant>> {
        self.grant_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .grants
            .lock()
            .get(&(customer_id.as_str().to_string(), caregiver_id.as_str().to_string()))
            .cloned())
    }

    async fn upsert_grant(
        &self,
        customer_id: &UserId,
        caregiver_id: &UserId,
        permissions: &SharedPermissions,
    ) -> Result<AccessGrant> {
        let grant = AccessGrant::new(
            customer_id.clone(),
            caregiver_id.clone(),
            permissions.clone(),
        );
        self.grants.lock().insert(
            (customer_id.as_str().to_string(), caregiver_id.as_str().to_string()),
            grant.clone(),
        );
        Ok(grant)
    }

    async fn revoke_grant(&self, customer_id: &UserId, caregiver_id: &UserId) -> Result<bool> {
        Ok(self
            .grants
            .lock()
            .remove(&(customer_id.as_str().to_string(), caregiver_id.as_str().to_string()))
            .is_some())
    }

    async fn resolve_owner_of_event(&self, event_id: &EventId) -> Result<Option<UserId>> {
        self.event_lookup_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_event_lookups.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        Ok(self
            .event_owners
            .lock()
            .get(event_id.as_str())
            .map(|owner| UserId::from_string(owner.clone())))
    }

    async fn resolve_owner_of_camera(&self, camera_id: &CameraId) -> Result<Option<UserId>> {
        self.camera_lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .camera_owners
            .lock()
            .get(camera_id.as_str())
            .map(|owner| UserId::from_string(owner.clone())))
    }

    async fn resolve_owner_of_snapshot(
        &self,
        snapshot_id: &SnapshotId,
    ) -> Result<Option<UserId>> {
        Ok(self
            .snapshot_owners
            .lock()
            .get(snapshot_id.as_str())
            .map(|owner| UserId::from_string(owner.clone())))
    }

    async fn resolve_owner_of_notification(
        &self,
        notification_id: &NotificationId,
    ) -> Result<Option<UserId>> {
        Ok(self
            .notification_owners
            .lock()
            .get(notification_id.as_str())
            .map(|owner| UserId::from_string(owner.clone())))
    }
}

fn resolver_with(store: Arc<MockGrantStore>) -> SharedAccessService {
    SharedAccessService::with_defaults(store)
}

fn short_ttl_config(ttl_ms: u64) -> SharedAccessConfig {
    SharedAccessConfig {
        cache_ttl_ms: ttl_ms,
        cache_capacity: 100,
        request_endpoint: "/api/shared-access/request".to_string(),
    }
}

fn gate_with(store: Arc<MockGrantStore>) -> SharedAccessGate {
    SharedAccessGate::new(
        resolver_with(store.clone()),
        TargetIdentityResolver::new(store),
        "/api/shared-access/request",
    )
}

// ---------------------------------------------------------------------------
// Resolver: relationship resolution and caching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn explicit_assignment_short_circuits_room_fallback() {
    let store = Arc::new(MockGrantStore::new().with_explicit("cus-1", "car-1"));
    let resolver = resolver_with(store.clone());

    let allowed = resolver
        .can_access_patient(&UserId::from("cus-1"), &UserId::from("car-1"))
        .await
        .unwrap();

    assert!(allowed);
    assert_eq!(store.explicit_calls(), 1);
    assert_eq!(store.room_calls(), 0, "room fallback must not run");
}

#[tokio::test]
async fn room_overlap_grants_access_without_explicit_link() {
    let store = Arc::new(MockGrantStore::new().with_room_overlap("cus-1", "car-1"));
    let resolver = resolver_with(store.clone());

    let allowed = resolver
        .can_access_patient(&UserId::from("cus-1"), &UserId::from("car-1"))
        .await
        .unwrap();

    assert!(allowed);
    assert_eq!(store.explicit_calls(), 1);
    assert_eq!(store.room_calls(), 1);
}

#[tokio::test]
async fn no_relationship_is_denied_and_the_denial_is_cached() {
    let store = Arc::new(MockGrantStore::new());
    let resolver = resolver_with(store.clone());
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    assert!(!resolver.can_access_patient(&customer, &caregiver).await.unwrap());
    assert!(!resolver.can_access_patient(&customer, &caregiver).await.unwrap());

    // Second call is served from cache, including the negative answer
    assert_eq!(store.explicit_calls(), 1);
    assert_eq!(store.room_calls(), 1);
}

#[tokio::test]
async fn positive_answers_are_cached_within_ttl() {
    let store = Arc::new(MockGrantStore::new().with_explicit("cus-1", "car-1"));
    let resolver = resolver_with(store.clone());
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    for _ in 0..5 {
        assert!(resolver.can_access_patient(&customer, &caregiver).await.unwrap());
    }

    assert_eq!(store.explicit_calls(), 1);
}

#[tokio::test]
async fn cache_expires_after_ttl() {
    let store = Arc::new(MockGrantStore::new().with_explicit("cus-1", "car-1"));
    let resolver = SharedAccessService::new(store.clone(), &short_ttl_config(40));
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    assert!(resolver.can_access_patient(&customer, &caregiver).await.unwrap());
    tokio::time::sleep(Duration::from_millis(90)).await;
    assert!(resolver.can_access_patient(&customer, &caregiver).await.unwrap());

    assert_eq!(store.explicit_calls(), 2, "expired entry must be refetched");
}

#[tokio::test]
async fn invalidate_pair_forces_a_refetch() {
    let store = Arc::new(MockGrantStore::new().with_explicit("cus-1", "car-1"));
    let resolver = resolver_with(store.clone());
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    assert!(resolver.can_access_patient(&customer, &caregiver).await.unwrap());
    resolver.invalidate_pair(&customer, &caregiver);
    assert!(resolver.can_access_patient(&customer, &caregiver).await.unwrap());

    assert_eq!(store.explicit_calls(), 2);
}

#[tokio::test]
async fn store_failure_propagates_as_error_not_denial() {
    let store = Arc::new(MockGrantStore::new());
    store.fail_explicit.store(true, Ordering::SeqCst);
    let resolver = resolver_with(store.clone());

    let result = resolver
        .can_access_patient(&UserId::from("cus-1"), &UserId::from("car-1"))
        .await;

    match result {
        Err(Error::Database(_)) => {}
        other => panic!("expected Database error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Resolver: permission lookups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn permissions_require_a_relationship() {
    // Grant row exists but no assignment links the pair
    let store = Arc::new(
        MockGrantStore::new().with_raw_grant("cus-1", "car-1", json!({"alert_read": true})),
    );
    let resolver = resolver_with(store.clone());
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    let permissions = resolver
        .get_shared_permissions(&customer, &caregiver)
        .await
        .unwrap();

    assert!(permissions.is_none());
    assert_eq!(store.grant_calls(), 0, "grant row must not be consulted");
    assert!(!resolver.has_permission(&customer, &caregiver, "alert:read").await.unwrap());
}

#[tokio::test]
async fn room_overlap_without_grant_row_yields_no_permissions() {
    let store = Arc::new(MockGrantStore::new().with_room_overlap("cus-1", "car-1"));
    let resolver = resolver_with(store.clone());
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    assert!(resolver.can_access_patient(&customer, &caregiver).await.unwrap());
    let permissions = resolver
        .get_shared_permissions(&customer, &caregiver)
        .await
        .unwrap();

    assert!(permissions.is_none());
    assert_eq!(store.grant_calls(), 1);
}

#[tokio::test]
async fn stored_maps_are_normalized_on_read() {
    // Raw row written before normalization rules: colon key, truthy number
    let store = Arc::new(
        MockGrantStore::new()
            .with_explicit("cus-1", "car-1")
            .with_raw_grant("cus-1", "car-1", json!({"alert:read": true, "stream_view": 1})),
    );
    let resolver = resolver_with(store);
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    // Both spellings answer for both keys
    assert!(resolver.has_permission(&customer, &caregiver, "alert:read").await.unwrap());
    assert!(resolver.has_permission(&customer, &caregiver, "alert_read").await.unwrap());
    assert!(resolver.has_permission(&customer, &caregiver, "stream:view").await.unwrap());
    assert!(resolver.has_permission(&customer, &caregiver, "stream_view").await.unwrap());
}

#[tokio::test]
async fn explicit_false_and_missing_keys_both_deny() {
    let store = Arc::new(
        MockGrantStore::new()
            .with_explicit("cus-1", "car-1")
            .with_raw_grant("cus-1", "car-1", json!({"alert_read": false, "stream_view": true})),
    );
    let resolver = resolver_with(store);
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    assert!(!resolver.has_permission(&customer, &caregiver, "alert:read").await.unwrap());
    assert!(!resolver.has_permission(&customer, &caregiver, "profile:view").await.unwrap());
    assert!(resolver.has_permission(&customer, &caregiver, "stream:view").await.unwrap());
}

#[tokio::test]
async fn check_access_role_fast_paths_skip_the_store() {
    let store = Arc::new(MockGrantStore::new());
    let resolver = resolver_with(store.clone());
    let customer = UserId::from("cus-1");

    let admin = Requester::admin(UserId::from("adm-1"));
    assert!(resolver.check_access(&admin, &customer, Some("alert:read")).await.unwrap());

    let self_customer = Requester::customer(UserId::from("cus-1"));
    assert!(resolver.check_access(&self_customer, &customer, None).await.unwrap());

    let other_customer = Requester::customer(UserId::from("cus-2"));
    assert!(!resolver.check_access(&other_customer, &customer, None).await.unwrap());

    assert_eq!(store.explicit_calls(), 0);
    assert_eq!(store.room_calls(), 0);
}

#[tokio::test]
async fn check_access_for_caregiver_walks_relationship_then_permission() {
    let store = Arc::new(
        MockGrantStore::new()
            .with_explicit("cus-1", "car-1")
            .with_raw_grant("cus-1", "car-1", json!({"alert_read": true})),
    );
    let resolver = resolver_with(store);
    let customer = UserId::from("cus-1");

    let caregiver = Requester::caregiver(UserId::from("car-1"));
    assert!(resolver.check_access(&caregiver, &customer, None).await.unwrap());
    assert!(resolver.check_access(&caregiver, &customer, Some("alert:read")).await.unwrap());
    assert!(!resolver.check_access(&caregiver, &customer, Some("profile:view")).await.unwrap());

    let stranger = Requester::caregiver(UserId::from("car-9"));
    assert!(!resolver.check_access(&stranger, &customer, None).await.unwrap());
}

// ---------------------------------------------------------------------------
// Target identity resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direct_keys_win_in_source_order() {
    let store = Arc::new(MockGrantStore::new());
    let targets = TargetIdentityResolver::new(store);
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    // Params beat query, query beats body
    let sources = TargetSources::new()
        .with_param("customer_id", "cus-param")
        .with_query("customer_id", "cus-query")
        .with_body("customer_id", "cus-body");
    assert_eq!(
        targets.resolve(&caregiver, &sources).await,
        Some(UserId::from("cus-param"))
    );

    let sources = TargetSources::new()
        .with_query("customerId", "cus-query")
        .with_body("customer_id", "cus-body");
    assert_eq!(
        targets.resolve(&caregiver, &sources).await,
        Some(UserId::from("cus-query"))
    );
}

#[tokio::test]
async fn json_bodies_contribute_scalar_fields_only() {
    let store = Arc::new(MockGrantStore::new());
    let targets = TargetIdentityResolver::new(store);
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    let mut sources = TargetSources::new();
    sources.absorb_json_body(&json!({
        "customer_id": "cus-body",
        "metadata": {"customer_id": "cus-nested"},
        "tags": ["a", "b"]
    }));

    assert_eq!(
        targets.resolve(&caregiver, &sources).await,
        Some(UserId::from("cus-body"))
    );
}

#[tokio::test]
async fn event_reference_resolves_through_camera_owner() {
    let store = Arc::new(MockGrantStore::new().with_event_owner("evt-1", "cus-1"));
    let targets = TargetIdentityResolver::new(store);
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    let sources = TargetSources::new().with_param("event_id", "evt-1");
    assert_eq!(
        targets.resolve(&caregiver, &sources).await,
        Some(UserId::from("cus-1"))
    );
}

#[tokio::test]
async fn failed_reference_lookup_falls_through_to_the_next_kind() {
    let store = Arc::new(
        MockGrantStore::new()
            .with_event_owner("evt-1", "cus-1")
            .with_camera_owner("cam-1", "cus-2"),
    );
    store.fail_event_lookups.store(true, Ordering::SeqCst);
    let targets = TargetIdentityResolver::new(store.clone());
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    let sources = TargetSources::new()
        .with_param("event_id", "evt-1")
        .with_param("camera_id", "cam-1");

    // Event lookup errors are swallowed; the camera reference still wins
    assert_eq!(
        targets.resolve(&caregiver, &sources).await,
        Some(UserId::from("cus-2"))
    );
    assert_eq!(store.camera_lookup_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn customers_default_to_themselves_caregivers_do_not() {
    let store = Arc::new(MockGrantStore::new());
    let targets = TargetIdentityResolver::new(store);
    let empty = TargetSources::new();

    let customer = Requester::customer(UserId::from("cus-1"));
    assert_eq!(
        targets.resolve(&customer, &empty).await,
        Some(UserId::from("cus-1"))
    );

    let caregiver = Requester::caregiver(UserId::from("car-1"));
    assert_eq!(targets.resolve(&caregiver, &empty).await, None);

    let notification = TargetSources::new().with_param("notification_id", "ntf-404");
    assert_eq!(targets.resolve(&caregiver, &notification).await, None);
}

#[tokio::test]
async fn notification_reference_resolves_to_recipient() {
    let store = Arc::new(MockGrantStore::new().with_notification_owner("ntf-1", "cus-1"));
    let targets = TargetIdentityResolver::new(store);
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    let sources = TargetSources::new().with_query("notificationId", "ntf-1");
    assert_eq!(
        targets.resolve(&caregiver, &sources).await,
        Some(UserId::from("cus-1"))
    );
}

// ---------------------------------------------------------------------------
// Authorization gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gate_rejects_missing_requester() {
    let store = Arc::new(MockGrantStore::new());
    let gate = gate_with(store);

    let result = gate.authorize(None, &TargetSources::new(), None).await;
    match result {
        Err(Error::Unauthenticated(_)) => {}
        other => panic!("expected Unauthenticated, got {other:?}"),
    }
}

#[tokio::test]
async fn gate_allows_admins_without_relationship_checks() {
    let store = Arc::new(MockGrantStore::new());
    let gate = gate_with(store.clone());
    let admin = Requester::admin(UserId::from("adm-1"));

    let sources = TargetSources::new().with_param("customer_id", "cus-1");
    let decision = gate.authorize(Some(&admin), &sources, Some("alert:read")).await.unwrap();

    assert_eq!(decision.target_customer_id, Some(UserId::from("cus-1")));
    assert_eq!(decision.permission_checked, None);
    assert_eq!(store.explicit_calls(), 0);
    assert_eq!(store.room_calls(), 0);
}

#[tokio::test]
async fn gate_admits_admins_before_indirect_target_resolution() {
    // Only an indirect reference: resolving it would need the store, so
    // the admin decision must not attempt it.
    let store = Arc::new(MockGrantStore::new().with_event_owner("evt-1", "cus-1"));
    let gate = gate_with(store.clone());
    let admin = Requester::admin(UserId::from("adm-1"));

    let sources = TargetSources::new().with_param("event_id", "evt-1");
    let decision = gate
        .authorize(Some(&admin), &sources, Some("alert:read"))
        .await
        .unwrap();

    assert_eq!(decision.target_customer_id, None);
    assert_eq!(
        store.event_lookup_calls.load(Ordering::SeqCst),
        0,
        "admin authorization must not consult the store"
    );
    assert_eq!(store.explicit_calls(), 0);
    assert_eq!(store.grant_calls(), 0);
}

#[tokio::test]
async fn gate_lets_customers_reach_only_their_own_data() {
    let store = Arc::new(MockGrantStore::new());
    let gate = gate_with(store.clone());
    let customer = Requester::customer(UserId::from("cus-1"));

    let own = TargetSources::new().with_param("customer_id", "cus-1");
    let decision = gate.authorize(Some(&customer), &own, None).await.unwrap();
    assert_eq!(decision.target_customer_id, Some(UserId::from("cus-1")));

    // No target keys at all: the customer is their own target
    let decision = gate
        .authorize(Some(&customer), &TargetSources::new(), None)
        .await
        .unwrap();
    assert_eq!(decision.target_customer_id, Some(UserId::from("cus-1")));

    let foreign = TargetSources::new().with_param("customer_id", "cus-2");
    let result = gate.authorize(Some(&customer), &foreign, None).await;
    match result {
        Err(Error::AccessDenied(_)) => {}
        other => panic!("expected AccessDenied, got {other:?}"),
    }

    // Customer decisions never consult the store
    assert_eq!(store.explicit_calls(), 0);
    assert_eq!(store.room_calls(), 0);
    assert_eq!(store.grant_calls(), 0);
}

#[tokio::test]
async fn gate_requires_a_resolvable_target_for_caregivers() {
    let store = Arc::new(MockGrantStore::new());
    let gate = gate_with(store);
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    let result = gate
        .authorize(Some(&caregiver), &TargetSources::new(), Some("alert:read"))
        .await;
    match result {
        Err(Error::AccessDenied(_)) => {}
        other => panic!("expected AccessDenied, got {other:?}"),
    }
}

#[tokio::test]
async fn gate_rejects_malformed_identifiers_as_bad_input() {
    let store = Arc::new(MockGrantStore::new().with_explicit("cus-1", "car-1"));
    let gate = gate_with(store.clone());

    // Malformed target id: a client error, not a permission verdict
    let caregiver = Requester::caregiver(UserId::from("car-1"));
    let sources = TargetSources::new().with_param("customer_id", "cus 1;drop");
    let result = gate
        .authorize(Some(&caregiver), &sources, Some("alert:read"))
        .await;
    match result {
        Err(Error::InvalidInput(message)) => assert!(message.contains("customer_id")),
        other => panic!("expected InvalidInput, got {other:?}"),
    }

    // Malformed caregiver id is caught the same way
    let bad_caregiver = Requester::caregiver(UserId::from("car 1"));
    let sources = TargetSources::new().with_param("customer_id", "cus-1");
    let result = gate.authorize(Some(&bad_caregiver), &sources, None).await;
    match result {
        Err(Error::InvalidInput(message)) => assert!(message.contains("caregiver_id")),
        other => panic!("expected InvalidInput, got {other:?}"),
    }

    // Rejected before any store traffic
    assert_eq!(store.explicit_calls(), 0);
    assert_eq!(store.room_calls(), 0);
}

#[tokio::test]
async fn gate_admits_caregivers_with_relationship_and_capability() {
    let store = Arc::new(
        MockGrantStore::new()
            .with_explicit("cus-1", "car-1")
            .with_raw_grant("cus-1", "car-1", json!({"alert_read": true})),
    );
    let gate = gate_with(store);
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    let sources = TargetSources::new().with_param("customer_id", "cus-1");
    let decision = gate
        .authorize(Some(&caregiver), &sources, Some("alert:read"))
        .await
        .unwrap();

    assert_eq!(decision.target_customer_id, Some(UserId::from("cus-1")));
    assert_eq!(decision.permission_checked.as_deref(), Some("alert:read"));
}

#[tokio::test]
async fn gate_denial_for_missing_relationship_carries_remediation() {
    let store = Arc::new(MockGrantStore::new());
    let gate = gate_with(store);
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    let sources = TargetSources::new().with_param("customer_id", "cus-1");
    let result = gate
        .authorize(Some(&caregiver), &sources, Some("stream:view"))
        .await;

    let denial = match result {
        Err(Error::PermissionRequired(denial)) => denial,
        other => panic!("expected PermissionRequired, got {other:?}"),
    };

    assert_eq!(denial.action, "request_permission");
    assert_eq!(denial.endpoint, "/api/shared-access/request");
    assert_eq!(denial.customer_id, "cus-1");
    assert_eq!(denial.caregiver_id, "car-1");
    assert_eq!(denial.permission_key.as_deref(), Some("stream:view"));
    assert!(denial.message.contains("has not shared"));
}

#[tokio::test]
async fn gate_denial_for_missing_capability_names_the_key() {
    // An explicit false denies the same way a missing key does
    let store = Arc::new(
        MockGrantStore::new()
            .with_explicit("cus-1", "car-1")
            .with_raw_grant("cus-1", "car-1", json!({"alert_read": true, "stream_view": false})),
    );
    let gate = gate_with(store);
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    let sources = TargetSources::new().with_param("customer_id", "cus-1");
    let result = gate
        .authorize(Some(&caregiver), &sources, Some("stream:view"))
        .await;

    let denial = match result {
        Err(Error::PermissionRequired(denial)) => denial,
        other => panic!("expected PermissionRequired, got {other:?}"),
    };

    assert!(denial.message.contains("stream:view"));
    assert_eq!(denial.permission_key.as_deref(), Some("stream:view"));
}

#[tokio::test]
async fn gate_resolves_caregiver_targets_through_resource_references() {
    let store = Arc::new(
        MockGrantStore::new()
            .with_event_owner("evt-1", "cus-1")
            .with_explicit("cus-1", "car-1"),
    );
    let gate = gate_with(store);
    let caregiver = Requester::caregiver(UserId::from("car-1"));

    let sources = TargetSources::new().with_param("event_id", "evt-1");
    let decision = gate.authorize(Some(&caregiver), &sources, None).await.unwrap();

    assert_eq!(decision.target_customer_id, Some(UserId::from("cus-1")));
    assert_eq!(decision.permission_checked, None);
}

// ---------------------------------------------------------------------------
// Grant lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn grants_are_validated_and_normalized_before_storage() {
    let store = Arc::new(MockGrantStore::new().with_explicit("cus-1", "car-1"));
    let resolver = resolver_with(store.clone());
    let service = GrantService::new(store, resolver.clone());
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    let grant = service
        .grant(
            &customer,
            &caregiver,
            &json!({
                "alert:read": true,
                "log_access_days": 30.9,
                "notification_channel": ["push", "sms", "push"]
            }),
        )
        .await
        .unwrap();

    // Stored canonically: underscore key plus colon alias, floored
    // retention, deduplicated channels
    assert!(grant.permissions.has_boolean_permission("alert_read"));
    assert!(grant.permissions.has_boolean_permission("alert:read"));
    assert_eq!(grant.permissions.retention_days("log_access_days"), 30);
    assert_eq!(
        grant.permissions.get("notification_channel"),
        Some(&json!(["push", "sms"]))
    );

    assert!(resolver.has_permission(&customer, &caregiver, "alert:read").await.unwrap());
}

#[tokio::test]
async fn invalid_grant_maps_are_rejected_listing_every_error() {
    let store = Arc::new(MockGrantStore::new());
    let resolver = resolver_with(store.clone());
    let service = GrantService::new(store, resolver);

    let result = service
        .grant(
            &UserId::from("cus-1"),
            &UserId::from("car-1"),
            &json!({
                "alert:read": "yes",
                "log_access_days": -5
            }),
        )
        .await;

    let message = match result {
        Err(Error::InvalidInput(message)) => message,
        other => panic!("expected InvalidInput, got {other:?}"),
    };
    assert!(message.contains("alert:read"));
    assert!(message.contains("log_access_days"));
}

#[tokio::test]
async fn granting_to_yourself_is_rejected() {
    let store = Arc::new(MockGrantStore::new());
    let resolver = resolver_with(store.clone());
    let service = GrantService::new(store, resolver);
    let user = UserId::from("cus-1");

    let result = service.grant(&user, &user, &json!({"alert_read": true})).await;
    match result {
        Err(Error::InvalidInput(message)) => {
            assert!(message.contains("different users"));
        }
        other => panic!("expected InvalidInput, got {other:?}"),
    }
}

#[tokio::test]
async fn grant_writes_invalidate_cached_permissions() {
    let store = Arc::new(MockGrantStore::new().with_explicit("cus-1", "car-1"));
    let resolver = resolver_with(store.clone());
    let service = GrantService::new(store, resolver.clone());
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    service
        .grant(&customer, &caregiver, &json!({"alert_read": true}))
        .await
        .unwrap();
    assert!(resolver.has_permission(&customer, &caregiver, "alert:read").await.unwrap());

    // Replace the map; the cached answer must not survive the write
    service
        .grant(&customer, &caregiver, &json!({"stream_view": true}))
        .await
        .unwrap();
    assert!(!resolver.has_permission(&customer, &caregiver, "alert:read").await.unwrap());
    assert!(resolver.has_permission(&customer, &caregiver, "stream:view").await.unwrap());
}

#[tokio::test]
async fn revocation_takes_effect_immediately() {
    let store = Arc::new(MockGrantStore::new().with_explicit("cus-1", "car-1"));
    let resolver = resolver_with(store.clone());
    let service = GrantService::new(store, resolver.clone());
    let customer = UserId::from("cus-1");
    let caregiver = UserId::from("car-1");

    service
        .grant(&customer, &caregiver, &json!({"alert_read": true}))
        .await
        .unwrap();
    assert!(resolver.has_permission(&customer, &caregiver, "alert:read").await.unwrap());

    assert!(service.revoke(&customer, &caregiver).await.unwrap());
    assert!(!resolver.has_permission(&customer, &caregiver, "alert:read").await.unwrap());
    assert!(service.get(&customer, &caregiver).await.unwrap().is_none());

    // Revoking again reports that nothing was live
    assert!(!service.revoke(&customer, &caregiver).await.unwrap());
}
