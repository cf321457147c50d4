//! Shared key-value store abstraction.
//!
//! The deterministic cache, rate/quota counters, and coalescer lease/response slots
//! all live behind single-key atomic primitives: `get`, `set`, `set_if_absent`,
//! `increment`, `expire`, `delete`. No multi-key transactions are required; the
//! coalescer's leader election specifically depends on `set_if_absent`'s atomicity —
//! that primitive, not any in-process lock, is what makes leader election correct.
//!
//! [`InMemorySharedStore`] is the default implementation, backed by `dashmap`. A
//! Redis-backed implementation can be dropped in behind the same trait without
//! touching the rate limiter or coalescer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// A value with an optional expiry instant.
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|exp| now < exp)
    }
}

/// Atomic primitives over a shared key-value store.
///
/// All operations are single-key; none require cross-key transactions.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Reads a value, if present and not expired.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Writes a value with an optional TTL, unconditionally overwriting any existing entry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>);

    /// Writes a value only if the key is absent or expired; returns `true` if this call
    /// performed the write (i.e. this caller "won" the key).
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> bool;

    /// Atomically increments a counter (creating it at 0 if absent) and returns the new value.
    /// `ttl` is applied only when the key did not previously exist.
    async fn increment(&self, key: &str, by: i64, ttl: Option<Duration>) -> i64;

    /// Returns the remaining TTL for a key, if it exists and carries one.
    async fn ttl(&self, key: &str) -> Option<Duration>;

    /// Deletes a key.
    async fn delete(&self, key: &str);

    /// Reads and parses a single hash field (modeled as `key:field`).
    async fn hash_get(&self, key: &str, field: &str) -> Option<Vec<u8>> {
        self.get(&hash_key(key, field)).await
    }

    /// Writes a single hash field.
    async fn hash_set(&self, key: &str, field: &str, value: Vec<u8>, ttl: Option<Duration>) {
        self.set(&hash_key(key, field), value, ttl).await
    }

    /// Atomically increments a single hash field.
    async fn hash_increment(&self, key: &str, field: &str, by: i64, ttl: Option<Duration>) -> i64 {
        self.increment(&hash_key(key, field), by, ttl).await
    }
}

fn hash_key(key: &str, field: &str) -> String {
    format!("{key}::{field}")
}

/// In-process [`SharedStore`] backed by `dashmap::DashMap`, the default implementation.
#[derive(Clone, Default)]
pub struct InMemorySharedStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
            },
        );
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> bool {
        let now = Instant::now();
        let expires_at = ttl.map(|d| now + d);
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    false
                } else {
                    occupied.insert(Entry { value, expires_at });
                    true
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry { value, expires_at });
                true
            }
        }
    }

    async fn increment(&self, key: &str, by: i64, ttl: Option<Duration>) -> i64 {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: 0i64.to_le_bytes().to_vec(),
                expires_at: ttl.map(|d| now + d),
            });

        if !entry.is_live(now) {
            entry.value = 0i64.to_le_bytes().to_vec();
            entry.expires_at = ttl.map(|d| now + d);
        }

        let current = i64::from_le_bytes(entry.value.clone().try_into().unwrap_or([0; 8]));
        let updated = current + by;
        entry.value = updated.to_le_bytes().to_vec();
        updated
    }

    async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries.get(key).and_then(|entry| {
            entry
                .expires_at
                .map(|exp| exp.saturating_duration_since(now))
        })
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}
