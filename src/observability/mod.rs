//! Async observability ingest.
//!
//! Uses the background-task idiom common elsewhere in this crate: an `AtomicBool`
//! run-guard started via `swap`, a `tokio::time::interval` loop, and a
//! clone-the-handle-and-spawn convention, here applied to batch flushing on
//! size-or-interval with a single-flight guard and dead-letter routing.

mod error;

pub use error::IngestError;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time;
use tracing::{debug, error, warn};

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_RETRIES};

/// A structured usage/billing event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub event_id: String,
    pub event_type: String,
    pub tenant: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// The columnar analytics store the ingest pipeline writes batches to, treated as an
/// external collaborator. `JSONEachRow` semantics: one row per event.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn insert_batch(&self, events: &[UsageEvent]) -> Result<(), IngestError>;
}

/// Destination for batches that exhausted their retry budget.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, events: Vec<UsageEvent>);
}

/// In-memory [`AnalyticsSink`] for tests: records every inserted batch.
#[derive(Default)]
pub struct InMemoryAnalyticsSink {
    batches: Mutex<Vec<Vec<UsageEvent>>>,
    fail_next: Mutex<u32>,
}

impl InMemoryAnalyticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` `insert_batch` calls fail, to exercise retry/DLQ paths.
    pub fn fail_next(&self, n: u32) {
        *self.fail_next.lock() = n;
    }

    pub fn batches(&self) -> Vec<Vec<UsageEvent>> {
        self.batches.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl AnalyticsSink for InMemoryAnalyticsSink {
    async fn insert_batch(&self, events: &[UsageEvent]) -> Result<(), IngestError> {
        let mut remaining = self.fail_next.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(IngestError::SinkFailed("forced test failure".to_string()));
        }
        drop(remaining);
        self.batches.lock().push(events.to_vec());
        Ok(())
    }
}

/// In-memory [`DeadLetterSink`] for tests.
#[derive(Default)]
pub struct InMemoryDeadLetterSink {
    events: Mutex<Vec<UsageEvent>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn send(&self, mut events: Vec<UsageEvent>) {
        self.events.lock().append(&mut events);
    }
}

/// Batches, retries, and flushes [`UsageEvent`]s to an [`AnalyticsSink`], routing
/// exhausted batches to a [`DeadLetterSink`].
#[derive(Clone)]
pub struct IngestPipeline {
    buffer: Arc<Mutex<Vec<UsageEvent>>>,
    sink: Arc<dyn AnalyticsSink>,
    dlq: Arc<dyn DeadLetterSink>,
    flushing: Arc<AtomicBool>,
    flush_loop_running: Arc<AtomicBool>,
    batch_size: usize,
    flush_interval: Duration,
    max_retries: u32,
}

impl IngestPipeline {
    pub fn new(sink: Arc<dyn AnalyticsSink>, dlq: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            sink,
            dlq,
            flushing: Arc::new(AtomicBool::new(false)),
            flush_loop_running: Arc::new(AtomicBool::new(false)),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Enqueues an event. Malformed events (missing `event_id`/`tenant`) are
    /// acknowledged and dropped rather than queued, to prevent a poison loop.
    /// Triggers an immediate flush once the buffer reaches `batch_size`.
    pub fn publish(&self, event: UsageEvent) {
        if event.event_id.trim().is_empty() {
            warn!("dropping malformed usage event: missing event_id");
            return;
        }
        if event.tenant.trim().is_empty() {
            warn!(event_id = %event.event_id, "dropping malformed usage event: missing tenant");
            return;
        }

        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push(event);
            buffer.len() >= self.batch_size
        };

        if should_flush {
            let pipeline = self.clone();
            tokio::spawn(async move { pipeline.flush().await });
        }
    }

    /// Starts the periodic flush loop (no-op if already running), following the
    /// guard-and-spawn pattern used elsewhere in this crate for background tasks.
    pub fn start_flush_loop(&self) -> tokio::task::JoinHandle<()> {
        if self.flush_loop_running.swap(true, Ordering::AcqRel) {
            return tokio::spawn(async {});
        }

        let pipeline = self.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(pipeline.flush_interval);
            loop {
                interval.tick().await;
                pipeline.flush().await;
            }
        })
    }

    /// Drains the buffer and inserts it as a single batch, serialized by a
    /// single-flight guard: a flush already in progress causes this call to return
    /// immediately rather than stack a second concurrent insert.
    pub async fn flush(&self) {
        if self.flushing.swap(true, Ordering::AcqRel) {
            return;
        }

        let batch = {
            let mut buffer = self.buffer.lock();
            std::mem::take(&mut *buffer)
        };

        if !batch.is_empty() {
            self.insert_with_retry(batch).await;
        }

        self.flushing.store(false, Ordering::Release);
    }

    async fn insert_with_retry(&self, batch: Vec<UsageEvent>) {
        let mut attempt = 0;
        loop {
            match self.sink.insert_batch(&batch).await {
                Ok(()) => {
                    debug!(count = batch.len(), "usage batch inserted");
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        error!(error = %e, attempt, "usage batch exhausted retries, routing to dead letter");
                        self.dlq.send(batch).await;
                        return;
                    }
                    warn!(error = %e, attempt, "usage batch insert failed, retrying");
                }
            }
        }
    }

    /// Flushes any buffered events immediately; used on graceful shutdown.
    pub async fn drain(&self) {
        self.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> UsageEvent {
        UsageEvent {
            event_id: id.to_string(),
            event_type: "usage.recorded".to_string(),
            tenant: "tenant-1".to_string(),
            run_id: "run-1".to_string(),
            timestamp: Utc::now(),
            payload: serde_json::json!({"tokens": 10}),
        }
    }

    fn pipeline() -> (IngestPipeline, Arc<InMemoryAnalyticsSink>, Arc<InMemoryDeadLetterSink>) {
        let sink = Arc::new(InMemoryAnalyticsSink::new());
        let dlq = Arc::new(InMemoryDeadLetterSink::new());
        (IngestPipeline::new(sink.clone(), dlq.clone()), sink, dlq)
    }

    #[tokio::test]
    async fn flush_inserts_buffered_events() {
        let (pipeline, sink, _dlq) = pipeline();
        pipeline.publish(event("e1"));
        pipeline.publish(event("e2"));
        pipeline.flush().await;
        assert_eq!(sink.event_count(), 2);
    }

    #[tokio::test]
    async fn malformed_events_are_dropped_not_queued() {
        let (pipeline, sink, _dlq) = pipeline();
        pipeline.publish(UsageEvent {
            event_id: String::new(),
            ..event("ignored")
        });
        pipeline.flush().await;
        assert_eq!(sink.event_count(), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_route_to_dead_letter() {
        let (pipeline, sink, dlq) = pipeline();
        sink.fail_next(DEFAULT_MAX_RETRIES);
        pipeline.publish(event("e1"));
        pipeline.flush().await;
        assert_eq!(sink.event_count(), 0);
        assert_eq!(dlq.events().len(), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failure_within_retry_budget() {
        let (pipeline, sink, dlq) = pipeline();
        sink.fail_next(DEFAULT_MAX_RETRIES - 1);
        pipeline.publish(event("e1"));
        pipeline.flush().await;
        assert_eq!(sink.event_count(), 1);
        assert!(dlq.events().is_empty());
    }
}
