//! Deterministic (exact-fingerprint) cache.
//!
//! A `moka::sync::Cache` wrapped in an `Arc`-cloneable handle, storing a full
//! [`CachedResponseEntry`] keyed by the fingerprint hex string, honoring a per-entry
//! TTL via `moka`'s [`Expiry`] trait since the effective TTL is per-tenant/per-endpoint
//! rather than a single cache-wide duration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;
use tracing::{debug, instrument};

use super::semantic::InvalidationFilter;
use super::types::CachedResponseEntry;

struct PerEntryExpiry;

impl Expiry<String, CachedResponseEntry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedResponseEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        let now = chrono::Utc::now();
        value.expires_at.map(|exp| {
            let remaining = (exp - now).num_milliseconds().max(0) as u64;
            let _ = created_at;
            Duration::from_millis(remaining)
        })
    }
}

/// Keyed put/get store of full cached responses, keyed by request fingerprint.
/// Streaming requests never pass through this cache — see
/// [`crate::cache::stream_cache`].
#[derive(Clone)]
pub struct DeterministicCache {
    entries: Cache<String, CachedResponseEntry>,
}

impl DeterministicCache {
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryExpiry)
                .build(),
        }
    }

    #[instrument(skip(self), fields(fingerprint = fingerprint))]
    pub fn get(&self, fingerprint: &str) -> Option<CachedResponseEntry> {
        let entry = self.entries.get(fingerprint)?;
        let now = chrono::Utc::now();
        if entry.is_live(now) {
            debug!("deterministic cache hit");
            Some(entry)
        } else {
            self.entries.invalidate(fingerprint);
            None
        }
    }

    #[instrument(skip(self, entry), fields(fingerprint = fingerprint))]
    pub fn put(&self, fingerprint: &str, entry: CachedResponseEntry) {
        self.entries.insert(fingerprint.to_string(), entry);
    }

    /// Removes a single entry; used by `/v1/cache/invalidate`.
    pub fn remove(&self, fingerprint: &str) {
        self.entries.invalidate(fingerprint);
    }

    /// Scans every live entry for `tenant_id` and removes the ones matching `filter`;
    /// returns the count removed. `/v1/cache/invalidate` must reach this cache too,
    /// not only the semantic one: a request can be cached deterministically on an
    /// exact-fingerprint hit well before any embedding is ever computed for it.
    #[instrument(skip(self, filter), fields(tenant_id = tenant_id))]
    pub fn invalidate(&self, tenant_id: &str, filter: &InvalidationFilter) -> usize {
        let now = chrono::Utc::now();
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.is_live(now) && entry.tenant_id == tenant_id && matches_filter(entry, filter)
            })
            .map(|(fingerprint, _)| fingerprint.as_str().to_string())
            .collect();

        for fingerprint in &stale {
            self.entries.invalidate(fingerprint);
        }
        stale.len()
    }

    /// Runs moka's pending maintenance tasks; exposed for deterministic tests.
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

fn matches_filter(entry: &CachedResponseEntry, filter: &InvalidationFilter) -> bool {
    if let Some(kind) = filter.kind
        && kind != entry.kind
    {
        return false;
    }
    if let Some(model) = &filter.model
        && !entry.model.eq_ignore_ascii_case(model)
    {
        return false;
    }
    if let Some(before) = filter.created_before
        && entry.generated_at >= before
    {
        return false;
    }
    if let Some(after) = filter.created_after
        && entry.generated_at <= after
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::TokenCounts;
    use crate::request::RequestKind;

    fn sample_entry(expires_in_secs: Option<i64>) -> CachedResponseEntry {
        sample_entry_for("tenant-1", "gpt-4o", expires_in_secs)
    }

    fn sample_entry_for(tenant_id: &str, model: &str, expires_in_secs: Option<i64>) -> CachedResponseEntry {
        CachedResponseEntry {
            payload: serde_json::json!({"ok": true}),
            model: model.to_string(),
            tenant_id: tenant_id.to_string(),
            kind: RequestKind::Chat,
            generated_at: chrono::Utc::now(),
            tokens: TokenCounts { input: 1, output: 1, total: 2 },
            expires_at: expires_in_secs.map(|s| chrono::Utc::now() + chrono::Duration::seconds(s)),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = DeterministicCache::with_capacity(100);
        cache.put("fp1", sample_entry(Some(60)));
        cache.run_pending_tasks();
        let got = cache.get("fp1").unwrap();
        assert_eq!(got.model, "gpt-4o");
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = DeterministicCache::with_capacity(100);
        cache.put("fp1", sample_entry(Some(-1)));
        assert!(cache.get("fp1").is_none());
    }

    #[test]
    fn never_expiring_entries_persist() {
        let cache = DeterministicCache::with_capacity(100);
        cache.put("fp1", sample_entry(None));
        assert!(cache.get("fp1").is_some());
    }

    #[test]
    fn remove_evicts_the_entry() {
        let cache = DeterministicCache::with_capacity(100);
        cache.put("fp1", sample_entry(Some(60)));
        cache.remove("fp1");
        cache.run_pending_tasks();
        assert!(cache.get("fp1").is_none());
    }

    #[test]
    fn invalidate_by_model_scopes_to_tenant_and_model() {
        let cache = DeterministicCache::with_capacity(100);
        cache.put("fp-mine", sample_entry_for("tenant-1", "gpt-4o", Some(60)));
        cache.put("fp-other-model", sample_entry_for("tenant-1", "claude-3", Some(60)));
        cache.put("fp-other-tenant", sample_entry_for("tenant-2", "gpt-4o", Some(60)));

        let removed = cache.invalidate(
            "tenant-1",
            &InvalidationFilter { model: Some("gpt-4o".to_string()), ..Default::default() },
        );

        assert_eq!(removed, 1);
        assert!(cache.get("fp-mine").is_none());
        assert!(cache.get("fp-other-model").is_some());
        assert!(cache.get("fp-other-tenant").is_some());
    }
}
