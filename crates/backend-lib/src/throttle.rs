// ============================
// crates/backend-lib/src/throttle.rs
// ============================
//! Token-bucket request throttling.
//!
//! Buckets are keyed by `(group, identity)` where the identity is a client
//! IP or a session id, depending on the middleware asking. Each group has a
//! fixed capacity and refill rate. A background sweeper drops buckets that
//! have been idle for longer than the configured threshold.

use dashmap::DashMap;
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{BucketGroupSettings, ThrottleSettings};
use crate::error::ConfigError;
use crate::metrics::{THROTTLE_DENIED, THROTTLE_SWEPT};
pub use crate::sweeper::SweeperHandle;

/// Bucket shape shared by every identity in a group
pub type BucketGroup = BucketGroupSettings;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    group: String,
    identity: String,
}

/// Per-identity bucket state
#[derive(Debug, Clone)]
struct TokenBucket {
    /// Available tokens, always within `[0, capacity]`
    tokens: f64,
    last_refill: Instant,
    last_access: Instant,
}

impl TokenBucket {
    fn full(group: &BucketGroup, now: Instant) -> Self {
        Self {
            tokens: f64::from(group.capacity),
            last_refill: now,
            last_access: now,
        }
    }

    /// Refill from elapsed time, then try to take one token
    fn try_consume(&mut self, group: &BucketGroup, now: Instant) -> bool {
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * group.refill_rate).min(f64::from(group.capacity));
            self.last_refill = now;
        }
        if now > self.last_access {
            self.last_access = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// In-memory store of token buckets
#[derive(Debug)]
pub struct BucketStore {
    groups: HashMap<String, BucketGroup>,
    buckets: DashMap<BucketKey, TokenBucket>,
    cleanup_cycle: Duration,
    cleanup_older_than: Duration,
}

impl BucketStore {
    /// Create a new bucket store
    pub fn new(
        groups: HashMap<String, BucketGroup>,
        cleanup_cycle: Duration,
        cleanup_older_than: Duration,
    ) -> Self {
        Self {
            groups,
            buckets: DashMap::new(),
            cleanup_cycle,
            cleanup_older_than,
        }
    }

    /// Create from validated settings
    pub fn from_settings(settings: &ThrottleSettings) -> Result<Self, ConfigError> {
        if settings.cleanup_cycle_secs == 0 || settings.cleanup_older_than_secs == 0 {
            return Err(ConfigError::Invalid(
                "throttle cleanup durations must be positive".to_string(),
            ));
        }
        for (group_id, group) in &settings.groups {
            group.check().map_err(|msg| {
                ConfigError::Invalid(format!("throttle group '{group_id}': {msg}"))
            })?;
        }
        Ok(Self::new(
            settings.groups.clone(),
            settings.cleanup_cycle(),
            settings.cleanup_older_than(),
        ))
    }

    pub fn has_group(&self, group_id: &str) -> bool {
        self.groups.contains_key(group_id)
    }

    /// Number of live buckets across all groups
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Admit or deny one request for `identity` in `group_id`.
    ///
    /// Refill and consumption happen under the bucket's map guard, so two
    /// callers for the same key never spend the same token.
    pub fn allow(&self, group_id: &str, identity: &str, now: Instant) -> bool {
        let Some(group) = self.groups.get(group_id) else {
            tracing::warn!(group = group_id, "throttle group not configured, denying");
            return false;
        };

        let key = BucketKey {
            group: group_id.to_string(),
            identity: identity.to_string(),
        };
        let allowed = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::full(group, now))
            .try_consume(group, now);

        if !allowed {
            counter!(THROTTLE_DENIED, "group" => group_id.to_string()).increment(1);
            tracing::debug!(group = group_id, identity, "request throttled");
        }
        allowed
    }

    /// Remove buckets idle for longer than the cleanup threshold
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        let older_than = self.cleanup_older_than;
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_access) <= older_than);
        let removed = before.saturating_sub(self.buckets.len());

        if removed > 0 {
            counter!(THROTTLE_SWEPT).increment(removed as u64);
            tracing::debug!(removed, remaining = self.buckets.len(), "swept idle throttle buckets");
        }
        removed
    }

    /// Spawn the periodic sweep task. It runs until the handle is shut down
    /// or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let store = Arc::clone(self);
        SweeperHandle::spawn(self.cleanup_cycle, move || {
            store.sweep(Instant::now());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: u32, refill_rate: f64) -> BucketStore {
        let mut groups = HashMap::new();
        groups.insert(
            "api".to_string(),
            BucketGroup {
                capacity,
                refill_rate,
            },
        );
        BucketStore::new(groups, Duration::from_secs(60), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_burst_admits_exactly_capacity() {
        let store = store(5, 0.01);
        let now = Instant::now();
        let admitted = (0..6).filter(|_| store.allow("api", "10.0.0.1", now)).count();
        assert_eq!(admitted, 5);
        assert!(!store.allow("api", "10.0.0.1", now));
    }

    #[tokio::test]
    async fn test_refill_over_time_is_capped() {
        let store = store(2, 1.0);
        let t0 = Instant::now();
        assert!(store.allow("api", "k", t0));
        assert!(store.allow("api", "k", t0));
        assert!(!store.allow("api", "k", t0));

        // One second later exactly one token is back
        let t1 = t0 + Duration::from_secs(1);
        assert!(store.allow("api", "k", t1));
        assert!(!store.allow("api", "k", t1));

        // A long pause never exceeds capacity
        let t2 = t1 + Duration::from_secs(3600);
        let admitted = (0..10).filter(|_| store.allow("api", "k", t2)).count();
        assert_eq!(admitted, 2);
    }

    #[tokio::test]
    async fn test_identities_and_groups_are_independent() {
        let store = store(1, 0.01);
        let now = Instant::now();
        assert!(store.allow("api", "a", now));
        assert!(!store.allow("api", "a", now));
        assert!(store.allow("api", "b", now));
        // Unknown group is denied
        assert!(!store.allow("login", "a", now));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_idle_buckets() {
        let store = store(3, 0.01);
        let t0 = Instant::now();
        store.allow("api", "old", t0);
        store.allow("api", "fresh", t0 + Duration::from_secs(200));

        let removed = store.sweep(t0 + Duration::from_secs(301));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);

        // A swept identity starts again with a full bucket
        let t1 = t0 + Duration::from_secs(302);
        let admitted = (0..4).filter(|_| store.allow("api", "old", t1)).count();
        assert_eq!(admitted, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_evicts_idle_buckets() {
        let store = Arc::new(store(3, 0.01));
        let sweeper = store.spawn_sweeper();

        store.allow("api", "10.0.0.9", Instant::now());
        assert_eq!(store.len(), 1);

        // Idle threshold is 300s, cycle is 60s
        tokio::time::sleep(Duration::from_secs(400)).await;
        assert!(store.is_empty());

        sweeper.shutdown().await;
    }

    #[test]
    fn test_from_settings_rejects_bad_group() {
        let mut settings = ThrottleSettings::default();
        assert!(BucketStore::from_settings(&settings).is_ok());

        settings.groups.get_mut("login").unwrap().capacity = 0;
        assert!(BucketStore::from_settings(&settings).is_err());
    }
}
