//! Cache entry and status types shared by the deterministic, semantic, and stream
//! caches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::RequestKind;

/// Header carrying the cache disposition of a response.
pub const CACHE_STATUS_HEADER: &str = "X-Cache";

/// How a response was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    Hit,
    HitSemantic,
    HitCoalesced,
    HitStream,
    Miss,
}

impl CacheStatus {
    pub fn as_header_value(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::HitSemantic => "HIT-SEMANTIC",
            CacheStatus::HitCoalesced => "HIT-COALESCED",
            CacheStatus::HitStream => "HIT-STREAM",
            CacheStatus::Miss => "MISS",
        }
    }

    pub fn is_hit(&self) -> bool {
        !matches!(self, CacheStatus::Miss)
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_header_value())
    }
}

/// Token accounting for a cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// A fully materialized, cacheable response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponseEntry {
    pub payload: serde_json::Value,
    pub model: String,
    /// Owning tenant, carried on the entry itself so `/v1/cache/invalidate` can scope
    /// a sweep of the deterministic cache without a tenant-keyed index.
    pub tenant_id: String,
    pub kind: RequestKind,
    pub generated_at: DateTime<Utc>,
    pub tokens: TokenCounts,
    /// `None` means the entry never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedResponseEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|exp| now < exp)
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.generated_at).num_seconds().max(0)
    }
}

/// A [`CachedResponseEntry`] plus the embedding/context metadata needed for
/// similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheEntry {
    pub entry: CachedResponseEntry,
    pub embedding: Vec<f32>,
    /// `"model:context-hash"`.
    pub bucket_key: String,
    pub source_text: String,
}

/// One parsed SSE line plus its arrival delta, used to replay a captured stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub raw_line: String,
    pub delta_since_previous_ms: u64,
}

/// A captured, replayable SSE transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamedResponseEntry {
    pub chunks: Vec<StreamChunk>,
    pub full_content: String,
    pub tokens: TokenCounts,
    /// True only if the upstream stream terminated cleanly and produced at least
    /// `MIN_CHUNKS_TO_CACHE` chunks.
    pub complete: bool,
    pub total_duration_ms: u64,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StreamedResponseEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|exp| now < exp)
    }
}
