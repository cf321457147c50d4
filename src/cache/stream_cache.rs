//! Streamed-response cache.
//!
//! A sibling of [`crate::cache::deterministic`]: same moka-backed, per-entry-TTL
//! shape, keyed by fingerprint, but storing [`StreamedResponseEntry`] instead of
//! [`CachedResponseEntry`]. Disjoint from the deterministic and semantic caches —
//! streaming responses are never served from the semantic cache (see DESIGN.md).

use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;
use tracing::instrument;

use super::types::StreamedResponseEntry;

struct PerEntryExpiry;

impl Expiry<String, StreamedResponseEntry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StreamedResponseEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        let now = chrono::Utc::now();
        value
            .expires_at
            .map(|exp| Duration::from_millis((exp - now).num_milliseconds().max(0) as u64))
    }
}

#[derive(Clone)]
pub struct StreamCache {
    entries: Cache<String, StreamedResponseEntry>,
}

impl StreamCache {
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryExpiry)
                .build(),
        }
    }

    #[instrument(skip(self), fields(fingerprint = fingerprint))]
    pub fn get(&self, fingerprint: &str) -> Option<StreamedResponseEntry> {
        let entry = self.entries.get(fingerprint)?;
        if entry.is_live(chrono::Utc::now()) {
            Some(entry)
        } else {
            self.entries.invalidate(fingerprint);
            None
        }
    }

    #[instrument(skip(self, entry), fields(fingerprint = fingerprint))]
    pub fn put(&self, fingerprint: &str, entry: StreamedResponseEntry) {
        self.entries.insert(fingerprint.to_string(), entry);
    }

    pub fn remove(&self, fingerprint: &str) {
        self.entries.invalidate(fingerprint);
    }

    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }
}
