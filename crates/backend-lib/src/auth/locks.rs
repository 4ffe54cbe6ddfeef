// ============================
// crates/backend-lib/src/auth/locks.rs
// ============================
//! Per-identity mutual exclusion.
//!
//! One async mutex per user session-index key, created on first use and
//! never removed. Growth is bounded by the number of distinct users that
//! ever logged in, and never dropping an entry means two tasks can not end
//! up holding different mutexes for the same key.
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-key locks
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        // Clone the handle out so the map shard is not held while waiting
        let mutex = match self.locks.get(key) {
            Some(existing) => Arc::clone(existing.value()),
            None => Arc::clone(
                self.locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .value(),
            ),
        };
        mutex.lock_owned().await
    }

    /// Number of keys that have ever been locked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
