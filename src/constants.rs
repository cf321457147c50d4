//! Cross-cutting, shared constants.

use std::time::Duration;

/// Default embedding vector dimension used when validating provider responses.
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Default per-tenant semantic-cache capacity; oldest entry evicted beyond this.
pub const DEFAULT_SEMANTIC_CACHE_CAPACITY: usize = 50;

/// Default semantic-similarity threshold when a tenant does not override it.
pub const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.85;

/// Minimum chunk count required before a stream is persisted to the stream cache.
pub const MIN_CHUNKS_TO_CACHE: usize = 3;

/// Cap on recorded-delta replay sleep; real delays longer than this are clamped.
pub const MAX_REPLAY_DELAY: Duration = Duration::from_millis(100);

/// Flat per-chunk delay used by "fast replay" mode.
pub const FAST_REPLAY_DELAY: Duration = Duration::from_millis(30);

/// Coalescer leader lease TTL.
pub const COALESCE_LEASE_TTL: Duration = Duration::from_secs(30);

/// Coalescer published-response slot TTL — just long enough for followers to read it.
pub const COALESCE_RESPONSE_TTL: Duration = Duration::from_secs(10);

/// Follower poll interval while awaiting the leader's response.
pub const COALESCE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Hard ceiling on follower wait time.
pub const COALESCE_WAIT_CEILING: Duration = Duration::from_secs(35);

/// Sliding rate-limit window width.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Default observability batch size before a flush is triggered.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default observability flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default maximum batch insertion retries before routing to the dead-letter sink.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default request body size bound, 1 MiB.
pub const DEFAULT_MAX_REQUEST_SIZE_BYTES: u64 = 1024 * 1024;
