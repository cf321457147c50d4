//! Per-tenant rate and quota admission.
//!
//! A fixed 60-second sliding window (bucketed by wall-clock minute) plus a UTC
//! month-scoped counter. Both live in the [`SharedStore`]; this module holds no
//! authoritative state of its own — every replica must agree on admission decisions.

mod error;

pub use error::{RateLimitError, RateLimitResult};

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use tracing::{instrument, warn};

use crate::constants::RATE_LIMIT_WINDOW;
use crate::shared_store::SharedStore;
use crate::tenant::Plan;

/// Result of a single [`RateLimiter::admit`] call: whether the request was allowed,
/// remaining budget, and when each window resets.
#[derive(Debug, Clone)]
pub struct Admission {
    pub allowed: bool,
    pub limit_per_minute: u32,
    pub remaining_per_minute: u32,
    pub minute_reset_at: DateTime<Utc>,
    pub quota_limit: u64,
    pub quota_remaining: u64,
    pub quota_reset_at: DateTime<Utc>,
    /// Set only when the minute window denied the request.
    pub retry_after_secs: Option<u64>,
}

impl Admission {
    pub fn denied_by_rate_limit(&self) -> bool {
        self.remaining_per_minute == 0 && self.retry_after_secs.is_some()
    }

    pub fn denied_by_quota(&self) -> bool {
        self.quota_remaining == 0 && !self.denied_by_rate_limit()
    }
}

/// Sliding-minute-window plus monthly-counter admission control.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Evaluates both the minute window and the monthly counter; denial of either
    /// denies the request.
    #[instrument(skip(self), fields(tenant_id = tenant_id, plan = plan.as_str()))]
    pub async fn admit(&self, tenant_id: &str, plan: Plan) -> Admission {
        let now = Utc::now();

        let minute_key = format!("ratelimit:minute:{tenant_id}:{}", minute_bucket(now));
        let minute_count = self
            .store
            .increment(&minute_key, 1, Some(RATE_LIMIT_WINDOW))
            .await;
        let limit_per_minute = plan.requests_per_minute();
        let minute_reset_at = next_minute_boundary(now);
        let remaining_per_minute = limit_per_minute.saturating_sub(minute_count.max(0) as u32);
        let minute_allowed = minute_count as u32 <= limit_per_minute;

        let month_key = format!("quota:{tenant_id}:{}", month_bucket(now));
        let month_count = self.read_counter(&month_key).await;
        let quota_limit = plan.requests_per_month();
        let quota_reset_at = next_month_boundary(now);
        let quota_remaining = quota_limit.saturating_sub(month_count.max(0) as u64);
        let quota_allowed = (month_count as u64) < quota_limit;

        let allowed = minute_allowed && quota_allowed;
        let retry_after_secs = if !minute_allowed {
            Some((minute_reset_at - now).num_seconds().max(0) as u64)
        } else {
            None
        };

        Admission {
            allowed,
            limit_per_minute,
            remaining_per_minute,
            minute_reset_at,
            quota_limit,
            quota_remaining,
            quota_reset_at,
            retry_after_secs,
        }
    }

    /// Increments the monthly counter. Called after admission, before dispatch,
    /// uniformly for hits and misses (see DESIGN.md for the rationale).
    #[instrument(skip(self), fields(tenant_id = tenant_id))]
    pub async fn observe(&self, tenant_id: &str) {
        let now = Utc::now();
        let month_key = format!("quota:{tenant_id}:{}", month_bucket(now));
        // ~35 days: long enough to span the month, short enough to self-clean.
        let ttl = std::time::Duration::from_secs(35 * 24 * 3600);
        self.store.increment(&month_key, 1, Some(ttl)).await;
    }

    async fn read_counter(&self, key: &str) -> i64 {
        match self.store.get(key).await {
            Some(bytes) => {
                let arr: Result<[u8; 8], _> = bytes.try_into();
                match arr {
                    Ok(arr) => i64::from_le_bytes(arr),
                    Err(_) => {
                        warn!(key, "counter value had unexpected width, treating as admitted");
                        0
                    }
                }
            }
            None => 0,
        }
    }
}

fn minute_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M").to_string()
}

fn month_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y%m").to_string()
}

fn next_minute_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = now
        .date_naive()
        .and_hms_opt(now.hour(), now.minute(), 0)
        .unwrap();
    let truncated = Utc.from_utc_datetime(&truncated);
    truncated + ChronoDuration::minutes(1)
}

fn next_month_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_store::InMemorySharedStore;

    #[tokio::test]
    async fn admits_within_plan_limit() {
        let limiter = RateLimiter::new(Arc::new(InMemorySharedStore::new()));
        for _ in 0..10 {
            let admission = limiter.admit("tenant-1", Plan::Free).await;
            assert!(admission.allowed);
        }
    }

    #[tokio::test]
    async fn denies_past_the_minute_limit() {
        let limiter = RateLimiter::new(Arc::new(InMemorySharedStore::new()));
        let mut last = limiter.admit("tenant-1", Plan::Free).await;
        for _ in 0..10 {
            last = limiter.admit("tenant-1", Plan::Free).await;
        }
        assert!(!last.allowed);
        assert!(last.retry_after_secs.unwrap() <= 60);
    }

    #[tokio::test]
    async fn quota_denies_independent_of_minute_window() {
        let limiter = RateLimiter::new(Arc::new(InMemorySharedStore::new()));
        for _ in 0..Plan::Free.requests_per_month() {
            limiter.observe("tenant-1").await;
        }
        let admission = limiter.admit("tenant-1", Plan::Free).await;
        assert!(!admission.allowed);
        assert_eq!(admission.quota_remaining, 0);
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let limiter = RateLimiter::new(Arc::new(InMemorySharedStore::new()));
        for _ in 0..10 {
            limiter.admit("tenant-a", Plan::Free).await;
        }
        let b = limiter.admit("tenant-b", Plan::Free).await;
        assert!(b.allowed);
    }
}
