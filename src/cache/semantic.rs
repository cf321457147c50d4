//! Semantic (vector-similarity) cache.
//!
//! Tenant-scoped `find`/`put` over an embedder-produced vector, using a
//! bounded-capacity linear scan rather than an external vector index: per-tenant
//! capacity is small (tens of entries), and the strict `bucket_key` pre-filter keeps
//! the inner-product dimension dominant, so brute force is the right tradeoff.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, instrument};

use super::types::SemanticCacheEntry;
use crate::request::RequestKind;

/// Per-tenant, per-kind bounded store. Oldest entry is evicted beyond `capacity` —
/// a hard upper bound regardless of TTL (see DESIGN.md for the rationale).
#[derive(Clone)]
pub struct SemanticCache {
    capacity: usize,
    buckets: Arc<RwLock<HashMap<(String, RequestKindKey), Vec<SemanticCacheEntry>>>>,
}

/// `RequestKind` is not `Hash`; this mirrors it for use as a map key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RequestKindKey {
    Chat,
    Completion,
}

impl From<RequestKind> for RequestKindKey {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Chat => RequestKindKey::Chat,
            RequestKind::Completion => RequestKindKey::Completion,
        }
    }
}

/// Filters accepted by [`SemanticCache::invalidate`].
#[derive(Debug, Clone, Default)]
pub struct InvalidationFilter {
    pub model: Option<String>,
    pub kind: Option<RequestKind>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
    pub min_similarity: Option<f32>,
    pub max_similarity: Option<f32>,
}

impl SemanticCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Retrieves the single best-matching live entry, if any clears `threshold`.
    /// Ties break toward the most-recently-generated entry.
    #[instrument(skip(self, query_embedding), fields(tenant_id = tenant_id, bucket_key = bucket_key, threshold = threshold))]
    pub fn find(
        &self,
        tenant_id: &str,
        kind: RequestKind,
        bucket_key: &str,
        query_embedding: &[f32],
        threshold: f32,
    ) -> Option<(SemanticCacheEntry, f32)> {
        let now = Utc::now();
        let buckets = self.buckets.read();
        let entries = buckets.get(&(tenant_id.to_string(), kind.into()))?;

        let mut best: Option<(&SemanticCacheEntry, f32)> = None;
        for entry in entries {
            if entry.bucket_key != bucket_key || !entry.entry.is_live(now) {
                continue;
            }
            let similarity = cosine_similarity(query_embedding, &entry.embedding);
            if similarity < threshold {
                continue;
            }
            best = match best {
                None => Some((entry, similarity)),
                Some((current, current_sim)) => {
                    if similarity > current_sim
                        || (similarity == current_sim
                            && entry.entry.generated_at > current.entry.generated_at)
                    {
                        Some((entry, similarity))
                    } else {
                        Some((current, current_sim))
                    }
                }
            };
        }

        let (entry, similarity) = best?;
        debug!(similarity, "semantic cache hit");
        Some((entry.clone(), similarity))
    }

    /// Writes through, attaching `expires_at`, then prunes to `capacity` and drops
    /// expired entries.
    #[instrument(skip(self, entry), fields(tenant_id = tenant_id))]
    pub fn put(&self, tenant_id: &str, kind: RequestKind, entry: SemanticCacheEntry) {
        let key = (tenant_id.to_string(), kind.into());
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(key).or_default();
        bucket.push(entry);

        let now = Utc::now();
        bucket.retain(|e| e.entry.is_live(now));

        if bucket.len() > self.capacity {
            bucket.sort_by_key(|e| e.entry.generated_at);
            let excess = bucket.len() - self.capacity;
            bucket.drain(0..excess);
        }
    }

    /// Removes entries matching every set filter field; returns the count removed.
    pub fn invalidate(&self, tenant_id: &str, filter: &InvalidationFilter) -> usize {
        let mut buckets = self.buckets.write();
        let mut removed = 0;
        for ((tenant, kind), entries) in buckets.iter_mut() {
            if tenant != tenant_id {
                continue;
            }
            if let Some(wanted) = filter.kind
                && RequestKindKey::from(wanted) != *kind
            {
                continue;
            }
            let before = entries.len();
            entries.retain(|e| !matches_filter(e, filter));
            removed += before - entries.len();
        }
        removed
    }

    /// Drops every expired entry for a tenant; returns the count removed.
    pub fn cleanup_expired(&self, tenant_id: &str) -> usize {
        let now = Utc::now();
        let mut buckets = self.buckets.write();
        let mut removed = 0;
        for ((tenant, _kind), entries) in buckets.iter_mut() {
            if tenant != tenant_id {
                continue;
            }
            let before = entries.len();
            entries.retain(|e| e.entry.is_live(now));
            removed += before - entries.len();
        }
        removed
    }
}

fn matches_filter(entry: &SemanticCacheEntry, filter: &InvalidationFilter) -> bool {
    if let Some(model) = &filter.model
        && !entry.entry.model.eq_ignore_ascii_case(model)
    {
        return false;
    }
    if let Some(before) = filter.created_before
        && entry.entry.generated_at >= before
    {
        return false;
    }
    if let Some(after) = filter.created_after
        && entry.entry.generated_at <= after
    {
        return false;
    }
    true
}

/// `dot(a, b) / (‖a‖ · ‖b‖)`, with a guard returning 0 if either norm is zero or the
/// vectors differ in length.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a_sq = 0.0f32;
    let mut norm_b_sq = 0.0f32;
    for (&av, &bv) in a.iter().zip(b.iter()) {
        dot += av * bv;
        norm_a_sq += av * av;
        norm_b_sq += bv * bv;
    }

    let norm_a = norm_a_sq.sqrt();
    let norm_b = norm_b_sq.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::{CachedResponseEntry, TokenCounts};

    fn entry(model: &str, bucket_key: &str, embedding: Vec<f32>) -> SemanticCacheEntry {
        SemanticCacheEntry {
            entry: CachedResponseEntry {
                payload: serde_json::json!({"ok": true}),
                model: model.to_string(),
                tenant_id: "tenant-1".to_string(),
                kind: RequestKind::Chat,
                generated_at: Utc::now(),
                tokens: TokenCounts::default(),
                expires_at: Some(Utc::now() + chrono::Duration::seconds(60)),
            },
            embedding,
            bucket_key: bucket_key.to_string(),
            source_text: "text".to_string(),
        }
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_guards_zero_norm_and_length_mismatch() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn find_respects_bucket_key_and_threshold() {
        let cache = SemanticCache::with_capacity(50);
        cache.put("tenant-1", RequestKind::Chat, entry("gpt-4o", "gpt-4o:ctx1", vec![1.0, 0.0]));

        // Wrong bucket key: no hit even though the vector is identical.
        assert!(
            cache
                .find("tenant-1", RequestKind::Chat, "gpt-4o:ctx2", &[1.0, 0.0], 0.5)
                .is_none()
        );

        let hit = cache
            .find("tenant-1", RequestKind::Chat, "gpt-4o:ctx1", &[1.0, 0.0], 0.5)
            .unwrap();
        assert!(hit.1 >= 0.99);

        // Orthogonal query misses against a 0.85 threshold.
        assert!(
            cache
                .find("tenant-1", RequestKind::Chat, "gpt-4o:ctx1", &[0.0, 1.0], 0.85)
                .is_none()
        );
    }

    #[test]
    fn put_prunes_to_capacity_dropping_oldest() {
        let cache = SemanticCache::with_capacity(2);
        for i in 0..5 {
            cache.put(
                "tenant-1",
                RequestKind::Chat,
                entry("gpt-4o", &format!("gpt-4o:ctx{i}"), vec![1.0, 0.0]),
            );
        }
        let removed = cache.cleanup_expired("tenant-1");
        assert_eq!(removed, 0);
        // Only the 2 most recent buckets should be retrievable.
        assert!(
            cache
                .find("tenant-1", RequestKind::Chat, "gpt-4o:ctx3", &[1.0, 0.0], 0.5)
                .is_some()
        );
        assert!(
            cache
                .find("tenant-1", RequestKind::Chat, "gpt-4o:ctx0", &[1.0, 0.0], 0.5)
                .is_none()
        );
    }

    #[test]
    fn invalidate_by_model_removes_matching_entries_only() {
        let cache = SemanticCache::with_capacity(50);
        cache.put("tenant-1", RequestKind::Chat, entry("gpt-4o", "gpt-4o:a", vec![1.0, 0.0]));
        cache.put("tenant-1", RequestKind::Chat, entry("claude-3", "claude-3:a", vec![1.0, 0.0]));

        let removed = cache.invalidate(
            "tenant-1",
            &InvalidationFilter {
                model: Some("gpt-4o".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(removed, 1);
        assert!(
            cache
                .find("tenant-1", RequestKind::Chat, "claude-3:a", &[1.0, 0.0], 0.5)
                .is_some()
        );
    }

    #[test]
    fn invalidate_by_kind_leaves_other_kind_untouched() {
        let cache = SemanticCache::with_capacity(50);
        cache.put("tenant-1", RequestKind::Chat, entry("gpt-4o", "gpt-4o:a", vec![1.0, 0.0]));
        cache.put("tenant-1", RequestKind::Completion, entry("gpt-4o", "gpt-4o:a", vec![1.0, 0.0]));

        let removed = cache.invalidate(
            "tenant-1",
            &InvalidationFilter {
                kind: Some(RequestKind::Chat),
                ..Default::default()
            },
        );
        assert_eq!(removed, 1);
        assert!(
            cache
                .find("tenant-1", RequestKind::Chat, "gpt-4o:a", &[1.0, 0.0], 0.5)
                .is_none()
        );
        assert!(
            cache
                .find("tenant-1", RequestKind::Completion, "gpt-4o:a", &[1.0, 0.0], 0.5)
                .is_some()
        );
    }
}
