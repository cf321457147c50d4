//! Tenant records and plan tiers.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

/// A named plan tier mapping to `(requests/minute, requests/month)`.
///
/// Concrete tier numbers are this crate's decision, recorded in DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plan {
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn requests_per_minute(&self) -> u32 {
        match self {
            Plan::Free => 10,
            Plan::Starter => 60,
            Plan::Pro => 600,
            Plan::Enterprise => 6_000,
        }
    }

    pub fn requests_per_month(&self) -> u64 {
        match self {
            Plan::Free => 1_000,
            Plan::Starter => 20_000,
            Plan::Pro => 500_000,
            Plan::Enterprise => 10_000_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Starter => "starter",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "free" => Some(Plan::Free),
            "starter" => Some(Plan::Starter),
            "pro" => Some(Plan::Pro),
            "enterprise" => Some(Plan::Enterprise),
            _ => None,
        }
    }
}

/// Per-tenant configuration.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: String,
    pub plan: Plan,
    /// Minimum cosine similarity for a semantic-cache hit, in `[0.50, 0.99]` (default 0.85).
    pub semantic_cache_threshold: f32,
    /// Default cache lifetime in seconds; `None` means "never" (unbounded).
    pub cache_ttl_seconds: Option<u64>,
    /// Per-endpoint TTL overrides, keyed by endpoint path.
    pub cache_ttl_endpoint_overrides: HashMap<String, Option<u64>>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, plan: Plan) -> Self {
        Self {
            id: id.into(),
            plan,
            semantic_cache_threshold: 0.85,
            cache_ttl_seconds: Some(3600),
            cache_ttl_endpoint_overrides: HashMap::new(),
        }
    }

    /// The effective TTL for a cache entry written via `endpoint`: the endpoint
    /// override if present, else the tenant default, else the environment default.
    pub fn effective_ttl(&self, endpoint: &str, env_default: u64) -> Option<u64> {
        if let Some(override_ttl) = self.cache_ttl_endpoint_overrides.get(endpoint) {
            return *override_ttl;
        }
        self.cache_ttl_seconds.or(Some(env_default))
    }
}

/// Resolves opaque API credentials to tenants. The real credential store is treated
/// as an external collaborator and is out of scope; this crate ships an in-memory
/// registry seeded from config, behind the same trait so a database-backed
/// implementation can be dropped in without touching callers.
pub trait TenantRegistry: Send + Sync {
    /// Resolves a bearer credential to its tenant, if the credential is known.
    fn resolve(&self, credential: &str) -> Option<Tenant>;
}

/// In-memory [`TenantRegistry`], keyed by the raw credential string.
#[derive(Clone, Default)]
pub struct InMemoryTenantRegistry {
    tenants: Arc<DashMap<String, Tenant>>,
}

impl InMemoryTenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a credential → tenant mapping.
    pub fn insert(&self, credential: impl Into<String>, tenant: Tenant) {
        self.tenants.insert(credential.into(), tenant);
    }
}

impl TenantRegistry for InMemoryTenantRegistry {
    fn resolve(&self, credential: &str) -> Option<Tenant> {
        self.tenants.get(credential).map(|entry| entry.clone())
    }
}
