//! Deterministic, semantic, and stream-replay caches.

pub mod deterministic;
pub mod semantic;
pub mod stream_cache;
pub mod types;

pub use deterministic::DeterministicCache;
pub use semantic::{InvalidationFilter, SemanticCache, cosine_similarity};
pub use stream_cache::StreamCache;
pub use types::{
    CACHE_STATUS_HEADER, CacheStatus, CachedResponseEntry, SemanticCacheEntry, StreamChunk,
    StreamedResponseEntry, TokenCounts,
};
