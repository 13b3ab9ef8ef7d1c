//! Time-bounded resolution cache.
//!
//! Resolved authorization answers are only trusted for a short window;
//! after that the next read must go back to the grant store. Expiry is
//! observed at read time: there is no background sweeper, an entry past
//! its deadline is simply removed by the `get` that finds it.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default answer lifetime when the caller does not configure one.
pub const DEFAULT_TTL: Duration = Duration::from_millis(30_000);

/// Soft default bound on entries per cache.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Cached value with its absolute expiry deadline.
#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent TTL cache. Cloning shares the underlying map.
pub struct TtlCache<K, V> {
    entries: Arc<DashMap<K, CacheEntry<V>>>,
    default_ttl: Duration,
    /// Soft bound: enforced by pruning expired entries on insert, not
    /// by evicting live ones.
    capacity: usize,
}

impl<K, V> Clone for TtlCache<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            default_ttl: self.default_ttl,
            capacity: self.capacity,
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    #[must_use]
    pub fn new(default_ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
            capacity,
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    /// Look up a live entry. An expired entry counts as a miss and is
    /// removed on the way out.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }

        // Deadline passed; drop the guard, then retract only an entry
        // still past its deadline so a racing reinsert survives
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    /// Store with the default TTL.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Store with an explicit per-entry TTL.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        if self.entries.len() >= self.capacity {
            self.prune_expired();
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop an entry. Returns the value if one was present, expired or
    /// not.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drop every entry past its deadline.
    pub fn prune_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_key, entry| entry.expires_at > now);
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::with_defaults()
    }
}
