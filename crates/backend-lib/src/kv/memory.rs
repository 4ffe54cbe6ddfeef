// ============================
// crates/backend-lib/src/kv/memory.rs
// ============================
//! In-process [`KvStore`] backed by a `DashMap`.
//!
//! Expiration is lazy: an expired key is dropped the next time it is
//! touched, or by the periodic sweep started with
//! [`MemoryKv::spawn_sweeper`] for keys nobody touches again. Time comes from `tokio::time::Instant` so tests running on a
//! paused clock can move TTLs forward.
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use tokio::time::Instant;

use super::{resolve_range, KvResult, KvStore};
use crate::error::StoreError;
use crate::metrics::KV_EXPIRED_SWEPT;
use crate::sweeper::SweeperHandle;

const DEFAULT_SCAN_COUNT: usize = 10;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Hash(_) => "hash",
            Value::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory key-value store
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, Entry>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining TTL of a key; `None` if absent or persistent
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.purge_expired(key);
        let now = Instant::now();
        self.entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of entries held, including expired ones not yet dropped
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Drop every entry whose TTL has passed
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            counter!(KV_EXPIRED_SWEPT).increment(removed as u64);
            tracing::debug!(removed, remaining = self.entries.len(), "swept expired keys");
        }
        removed
    }

    /// Spawn a task sweeping expired entries every `period`
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> SweeperHandle {
        let kv = Arc::clone(self);
        SweeperHandle::spawn(period, move || {
            kv.sweep_expired(Instant::now());
        })
    }

    fn purge_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, e| e.is_expired(now));
    }

    fn expiry_for(ttl: Duration) -> Option<Instant> {
        if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Self::expiry_for(ttl),
            },
        );
        Ok(())
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> KvResult<()> {
        self.purge_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        match &mut entry.value {
            Value::Hash(map) => {
                map.insert(field.to_string(), value.to_string());
                Ok(())
            },
            _ => Err(wrong_type(key)),
        }
    }

    async fn get_field(&self, key: &str, field: &str) -> KvResult<Option<String>> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Hash(map) => Ok(map.get(field).cloned()),
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn set_fields(&self, key: &str, fields: &HashMap<String, String>) -> KvResult<()> {
        self.purge_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        match &mut entry.value {
            Value::Hash(map) => {
                map.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            },
            _ => Err(wrong_type(key)),
        }
    }

    async fn get_all_fields(&self, key: &str) -> KvResult<HashMap<String, String>> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(HashMap::new()),
            Some(entry) => match &entry.value {
                Value::Hash(map) => Ok(map.clone()),
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool> {
        self.purge_expired(key);
        if ttl.is_zero() {
            return Ok(self.entries.remove(key).is_some());
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Self::expiry_for(ttl);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        self.purge_expired(key);
        Ok(self.entries.contains_key(key))
    }

    async fn delete(&self, keys: &[String]) -> KvResult<u64> {
        let mut removed = 0;
        for key in keys {
            self.purge_expired(key);
            if self.entries.remove(key.as_str()).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn push(&self, key: &str, value: &str) -> KvResult<u64> {
        self.purge_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        match &mut entry.value {
            Value::List(list) => {
                list.push_back(value.to_string());
                Ok(list.len() as u64)
            },
            _ => Err(wrong_type(key)),
        }
    }

    async fn len(&self, key: &str) -> KvResult<u64> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.len() as u64),
                _ => Err(wrong_type(key)),
            },
        }
    }

    async fn range(&self, key: &str, start: i64, end: i64) -> KvResult<Vec<String>> {
        self.purge_expired(key);
        let Some(entry) = self.entries.get(key) else {
            return Ok(Vec::new());
        };
        let Value::List(list) = &entry.value else {
            return Err(wrong_type(key));
        };
        Ok(match resolve_range(list.len(), start, end) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn trim(&self, key: &str, start: i64, end: i64) -> KvResult<()> {
        self.purge_expired(key);
        let emptied = {
            let Some(mut entry) = self.entries.get_mut(key) else {
                return Ok(());
            };
            let Value::List(list) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            match resolve_range(list.len(), start, end) {
                Some((from, to)) => {
                    list.truncate(to + 1);
                    list.drain(..from);
                    false
                },
                None => true,
            }
        };
        // An empty list does not exist
        if emptied {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn remove(&self, key: &str, value: &str) -> KvResult<u64> {
        self.purge_expired(key);
        let (removed, emptied) = {
            let Some(mut entry) = self.entries.get_mut(key) else {
                return Ok(0);
            };
            let Value::List(list) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            let before = list.len();
            list.retain(|v| v != value);
            ((before - list.len()) as u64, list.is_empty())
        };
        if emptied {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    async fn scan_keys(
        &self,
        cursor: Option<u64>,
        count: usize,
    ) -> KvResult<(Vec<String>, Option<u64>)> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort_unstable();

        let count = if count == 0 { DEFAULT_SCAN_COUNT } else { count };
        let start = (cursor.unwrap_or(0) as usize).min(keys.len());
        let end = (start + count).min(keys.len());
        let next = (end < keys.len()).then_some(end as u64);
        Ok((keys[start..end].to_vec(), next))
    }

    async fn key_type(&self, key: &str) -> KvResult<String> {
        self.purge_expired(key);
        Ok(self
            .entries
            .get(key)
            .map_or("none", |e| e.value.type_name())
            .to_string())
    }
}
