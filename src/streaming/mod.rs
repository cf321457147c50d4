//! Stream capture-and-replay.
//!
//! [`tee_live_stream`] forwards every upstream byte to the client unmodified while a
//! side buffer assembles a [`StreamedResponseEntry`]; [`replay_stream`] synthesizes
//! an SSE stream from a previously captured one.

mod error;

pub use error::StreamError;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::stream;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{StreamCache, StreamChunk, StreamedResponseEntry, TokenCounts};
use crate::constants::{FAST_REPLAY_DELAY, MAX_REPLAY_DELAY, MIN_CHUNKS_TO_CACHE};
use crate::provider::{ByteStream, ProviderResult};

/// `ceil(len(text)/4)` token estimate for streamed entries, where exact upstream
/// usage accounting is unavailable mid-stream. Applied to both input and output.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

struct CaptureState {
    leftover: String,
    chunks: Vec<StreamChunk>,
    full_content: String,
    start: Instant,
    last_chunk_at: Instant,
    done_seen: bool,
    failed: bool,
}

impl CaptureState {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            leftover: String::new(),
            chunks: Vec::new(),
            full_content: String::new(),
            start: now,
            last_chunk_at: now,
            done_seen: false,
            failed: false,
        }
    }

    /// Reassembles partial lines spanning buffer boundaries before parsing.
    fn record_bytes(&mut self, bytes: &[u8]) {
        self.leftover.push_str(&String::from_utf8_lossy(bytes));
        while let Some(idx) = self.leftover.find("\n\n") {
            let segment: String = self.leftover.drain(..idx + 2).collect();
            self.ingest_line(segment.trim());
        }
    }

    fn ingest_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        let now = Instant::now();
        let delta = now.duration_since(self.last_chunk_at).as_millis() as u64;
        self.last_chunk_at = now;
        self.chunks.push(StreamChunk {
            raw_line: line.to_string(),
            delta_since_previous_ms: delta,
        });

        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return;
        };
        if data == "[DONE]" {
            self.done_seen = true;
            return;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(data)
            && let Some(content) = value["choices"][0]["delta"]["content"].as_str()
        {
            self.full_content.push_str(content);
        }
    }

    /// A trailing partial line at end-of-stream is emitted as a final chunk and
    /// parsed if complete.
    fn finalize_leftover(&mut self) {
        if !self.leftover.trim().is_empty() {
            let line = std::mem::take(&mut self.leftover);
            self.ingest_line(line.trim());
        }
    }

    fn complete(&self) -> bool {
        !self.failed && self.done_seen && self.chunks.len() >= MIN_CHUNKS_TO_CACHE
    }

    fn into_entry(mut self, model: String, expires_at: Option<chrono::DateTime<chrono::Utc>>) -> StreamedResponseEntry {
        self.finalize_leftover();
        let complete = self.complete();
        let tokens = TokenCounts {
            input: estimate_tokens(&self.full_content),
            output: estimate_tokens(&self.full_content),
            total: estimate_tokens(&self.full_content) * 2,
        };
        StreamedResponseEntry {
            chunks: self.chunks,
            full_content: self.full_content,
            tokens,
            complete,
            total_duration_ms: self.start.elapsed().as_millis() as u64,
            model,
            generated_at: chrono::Utc::now(),
            expires_at,
        }
    }
}

/// Tees an upstream byte stream: every byte is forwarded to the caller unmodified
/// and in order, while a side buffer reassembles SSE lines to build a replayable
/// transcript. On clean termination with at least [`MIN_CHUNKS_TO_CACHE`] chunks,
/// the transcript is written to `stream_cache` keyed by `fingerprint`; on upstream
/// error nothing is cached.
pub fn tee_live_stream(
    upstream: ByteStream,
    stream_cache: Arc<StreamCache>,
    fingerprint: String,
    model: String,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
) -> ByteStream {
    let capture = Arc::new(Mutex::new(Some(CaptureState::new())));

    let state = (upstream, capture, stream_cache, fingerprint, model, expires_at);
    let out = stream::unfold(state, move |(mut inner, capture, stream_cache, fingerprint, model, expires_at)| async move {
        match futures_util::StreamExt::next(&mut inner).await {
            Some(Ok(bytes)) => {
                if let Some(state) = capture.lock().as_mut() {
                    state.record_bytes(&bytes);
                }
                Some((Ok(bytes), (inner, capture, stream_cache, fingerprint, model, expires_at)))
            }
            Some(Err(e)) => {
                if let Some(state) = capture.lock().as_mut() {
                    state.failed = true;
                }
                warn!(error = %e, "upstream stream interrupted, response will not be cached");
                Some((Err(e), (inner, capture, stream_cache, fingerprint, model, expires_at)))
            }
            None => {
                if let Some(state) = capture.lock().take() {
                    let entry = state.into_entry(model, expires_at);
                    if entry.complete {
                        debug!(fingerprint = %fingerprint, chunks = entry.chunks.len(), "persisting streamed transcript");
                        stream_cache.put(&fingerprint, entry);
                    }
                }
                None
            }
        }
    });

    Box::pin(out)
}

/// Synthesizes an SSE byte stream from a captured transcript, for a cache hit on a
/// streaming request. Sleeps `min(recorded-delta, 100ms)` between chunks, or a flat
/// 30ms when `fast_replay` is set.
pub fn replay_stream(entry: StreamedResponseEntry, fast_replay: bool) -> ByteStream {
    let chunks = entry.chunks;
    let out = stream::unfold(chunks.into_iter(), move |mut iter| async move {
        let chunk = iter.next()?;
        let delay = if fast_replay {
            FAST_REPLAY_DELAY
        } else {
            Duration::from_millis(chunk.delta_since_previous_ms).min(MAX_REPLAY_DELAY)
        };
        tokio::time::sleep(delay).await;
        let line = format!("{}\n\n", chunk.raw_line);
        let result: ProviderResult<Bytes> = Ok(Bytes::from(line.into_bytes()));
        Some((result, iter))
    });
    Box::pin(out)
}
