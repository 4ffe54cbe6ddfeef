// ============================
// crates/backend-lib/src/kv/mod.rs
// ============================
//! Key-value store port.
//!
//! The session core only talks to its backend through [`KvStore`]. The
//! contract mirrors what a Redis-like server offers: plain string values,
//! hashes, lists, per-key expiration and cursor-based key scans. Real
//! network backends live outside this crate; [`MemoryKv`] is the in-process
//! implementation used by the server binary and by tests.
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

mod memory;

pub use memory::MemoryKv;

/// Result of a single KV round-trip
pub type KvResult<T> = Result<T, StoreError>;

/// Trait for key-value backends
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a string value
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Write a string value with a TTL (`Duration::ZERO` means no expiry)
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    /// Write one field of a hash, creating the hash if needed
    async fn set_field(&self, key: &str, field: &str, value: &str) -> KvResult<()>;

    /// Read one field of a hash
    async fn get_field(&self, key: &str, field: &str) -> KvResult<Option<String>>;

    /// Write several fields of a hash at once
    async fn set_fields(&self, key: &str, fields: &HashMap<String, String>) -> KvResult<()>;

    /// Read a whole hash, empty when the key is absent
    async fn get_all_fields(&self, key: &str) -> KvResult<HashMap<String, String>>;

    /// Set the TTL of an existing key; `false` if the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool>;

    async fn exists(&self, key: &str) -> KvResult<bool>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> KvResult<u64>;

    /// Append to the tail of a list, returning the new length
    async fn push(&self, key: &str, value: &str) -> KvResult<u64>;

    /// Length of a list, 0 when absent
    async fn len(&self, key: &str) -> KvResult<u64>;

    /// Inclusive, zero-indexed slice of a list; negative indexes count from
    /// the tail (`-1` is the last element)
    async fn range(&self, key: &str, start: i64, end: i64) -> KvResult<Vec<String>>;

    /// Keep only the given inclusive index range of a list
    async fn trim(&self, key: &str, start: i64, end: i64) -> KvResult<()>;

    /// Remove every occurrence of `value` from a list, returning how many
    /// were removed
    async fn remove(&self, key: &str, value: &str) -> KvResult<u64>;

    /// One page of a key scan. Pass `None` to start; a `None` next cursor
    /// means the scan is complete.
    async fn scan_keys(
        &self,
        cursor: Option<u64>,
        count: usize,
    ) -> KvResult<(Vec<String>, Option<u64>)>;

    /// `string`, `hash`, `list` or `none`
    async fn key_type(&self, key: &str) -> KvResult<String>;
}

/// Resolve a Redis-style inclusive index range against a list length.
/// Returns `None` when the range selects nothing.
pub(crate) fn resolve_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    if len == 0 {
        return None;
    }
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if start > end || start >= len || end < 0 {
        return None;
    }
    Some((start as usize, end as usize))
}
