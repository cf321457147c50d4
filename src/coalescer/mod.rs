//! Request coalescer: at-most-one upstream call per identical in-flight fingerprint.
//!
//! Leader election rides on [`SharedStore::set_if_absent`]'s atomicity — that
//! primitive, not any in-process lock, is what makes leader election correct across
//! replicas. Coalescing statistics use an `RwLock`-wrapped in-process handle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::constants::{
    COALESCE_LEASE_TTL, COALESCE_POLL_INTERVAL, COALESCE_RESPONSE_TTL, COALESCE_WAIT_CEILING,
};
use crate::hashing::hash_context;
use crate::shared_store::SharedStore;

/// Outcome of [`Coalescer::acquire`]: whether the caller became leader, and if not,
/// the request id of the request it is now following.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub leader: bool,
    pub existing_request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseRecord {
    request_id: String,
}

/// Per-tenant-per-month coalescing statistics, kept in-process as a cache over the
/// shared store's authoritative view — never the source of truth for admission
/// decisions, just a local view for reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoalesceStats {
    pub coalesced_count: u64,
    pub peak_concurrent_followers: u64,
}

/// Leader/follower coordination for in-flight, non-streaming requests.
///
/// Coalescing does not apply to streaming requests: followers cannot be served from
/// a single live stream in this design.
#[derive(Clone)]
pub struct Coalescer {
    store: Arc<dyn SharedStore>,
    stats: Arc<RwLock<HashMap<u64, CoalesceStats>>>,
    active_followers: Arc<RwLock<HashMap<String, u64>>>,
}

impl Coalescer {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            stats: Arc::new(RwLock::new(HashMap::new())),
            active_followers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attempts to install the caller as leader under a short-lived lease. If the
    /// existing lease is older than [`COALESCE_LEASE_TTL`] it will already have
    /// expired in the shared store, so this caller forcibly reclaims leadership.
    #[instrument(skip(self), fields(tenant_id = tenant_id, fingerprint = fingerprint))]
    pub async fn acquire(
        &self,
        tenant_id: &str,
        fingerprint: &str,
        request_id: &str,
    ) -> Acquisition {
        let lease_key = lease_key(tenant_id, fingerprint);
        let record = LeaseRecord {
            request_id: request_id.to_string(),
        };
        let encoded = serde_json::to_vec(&record).unwrap_or_default();

        let won = self
            .store
            .set_if_absent(&lease_key, encoded, Some(COALESCE_LEASE_TTL))
            .await;

        if won {
            debug!("acquired coalescer leadership");
            Acquisition {
                leader: true,
                existing_request_id: None,
            }
        } else {
            let existing = self
                .store
                .get(&lease_key)
                .await
                .and_then(|bytes| serde_json::from_slice::<LeaseRecord>(&bytes).ok())
                .map(|r| r.request_id);
            self.record_follower(tenant_id, &lease_key);
            Acquisition {
                leader: false,
                existing_request_id: existing,
            }
        }
    }

    /// Follower wait loop: polls the response slot every ~50ms up to a hard ceiling
    /// of 35s. Returns `None` if the leader's lease disappeared without publishing
    /// (failed leader) or the ceiling elapsed.
    #[instrument(skip(self), fields(tenant_id = tenant_id, fingerprint = fingerprint))]
    pub async fn await_response(&self, tenant_id: &str, fingerprint: &str) -> Option<Vec<u8>> {
        let response_key = response_key(tenant_id, fingerprint);
        let lease_key = lease_key(tenant_id, fingerprint);
        let deadline = tokio::time::Instant::now() + COALESCE_WAIT_CEILING;

        loop {
            if let Some(response) = self.store.get(&response_key).await {
                return Some(response);
            }

            if self.store.get(&lease_key).await.is_none() {
                warn!("coalescer leader lease disappeared without publishing");
                return None;
            }

            if tokio::time::Instant::now() >= deadline {
                debug!("coalescer follower wait ceiling elapsed");
                return None;
            }

            sleep(COALESCE_POLL_INTERVAL).await;
        }
    }

    /// Leader stores the response in a short-lived slot and releases the lease.
    #[instrument(skip(self, response), fields(tenant_id = tenant_id, fingerprint = fingerprint))]
    pub async fn publish(&self, tenant_id: &str, fingerprint: &str, response: Vec<u8>) {
        let response_key = response_key(tenant_id, fingerprint);
        self.store
            .set(&response_key, response, Some(COALESCE_RESPONSE_TTL))
            .await;
        self.store.delete(&lease_key(tenant_id, fingerprint)).await;
    }

    /// Leader releases the lease without publishing (called on upstream error).
    #[instrument(skip(self), fields(tenant_id = tenant_id, fingerprint = fingerprint))]
    pub async fn release(&self, tenant_id: &str, fingerprint: &str) {
        self.store.delete(&lease_key(tenant_id, fingerprint)).await;
    }

    fn record_follower(&self, tenant_id: &str, lease_key: &str) {
        let month = chrono::Utc::now().format("%Y%m").to_string();
        let stats_key = hash_context(tenant_id, &month);
        let mut stats = self.stats.write();
        let entry = stats.entry(stats_key).or_default();
        entry.coalesced_count += 1;

        let mut active = self.active_followers.write();
        let count = active.entry(lease_key.to_string()).or_insert(0);
        *count += 1;
        entry.peak_concurrent_followers = entry.peak_concurrent_followers.max(*count);
    }

    /// Returns this process's cached view of coalescing stats for `(tenant, month)`.
    pub fn stats(&self, tenant_id: &str, month: &str) -> CoalesceStats {
        let key = hash_context(tenant_id, month);
        self.stats.read().get(&key).copied().unwrap_or_default()
    }
}

fn lease_key(tenant_id: &str, fingerprint: &str) -> String {
    format!("coalesce:lease:{tenant_id}:{fingerprint}")
}

fn response_key(tenant_id: &str, fingerprint: &str) -> String {
    format!("coalesce:response:{tenant_id}:{fingerprint}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_store::InMemorySharedStore;

    fn coalescer() -> Coalescer {
        Coalescer::new(Arc::new(InMemorySharedStore::new()))
    }

    #[tokio::test]
    async fn first_caller_becomes_leader() {
        let c = coalescer();
        let acq = c.acquire("t1", "fp1", "req-1").await;
        assert!(acq.leader);
    }

    #[tokio::test]
    async fn second_caller_becomes_follower() {
        let c = coalescer();
        c.acquire("t1", "fp1", "req-1").await;
        let acq = c.acquire("t1", "fp1", "req-2").await;
        assert!(!acq.leader);
        assert_eq!(acq.existing_request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn follower_receives_published_response() {
        let c = coalescer();
        c.acquire("t1", "fp1", "req-1").await;
        c.acquire("t1", "fp1", "req-2").await;
        c.publish("t1", "fp1", b"result".to_vec()).await;

        let got = c.await_response("t1", "fp1").await;
        assert_eq!(got, Some(b"result".to_vec()));
    }

    #[tokio::test]
    async fn released_lease_allows_promotion() {
        let c = coalescer();
        c.acquire("t1", "fp1", "req-1").await;
        c.release("t1", "fp1").await;
        let acq = c.acquire("t1", "fp1", "req-2").await;
        assert!(acq.leader);
    }

    #[tokio::test]
    async fn failed_leader_returns_none_to_follower() {
        let c = coalescer();
        c.acquire("t1", "fp1", "req-1").await;
        c.release("t1", "fp1").await;
        let got = c.await_response("t1", "fp1").await;
        assert!(got.is_none());
    }
}
