use std::sync::Arc;

use crate::cache::SemanticCache;
use crate::pipeline::RequestPipeline;
use crate::tenant::TenantRegistry;

/// Shared application state handed to every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
    pub tenants: Arc<dyn TenantRegistry>,
    pub semantic: Arc<SemanticCache>,
    pub deterministic: Arc<crate::cache::DeterministicCache>,
    pub max_request_size_bytes: u64,
    pub provider_name: String,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: Arc<RequestPipeline>,
        tenants: Arc<dyn TenantRegistry>,
        semantic: Arc<SemanticCache>,
        deterministic: Arc<crate::cache::DeterministicCache>,
        max_request_size_bytes: u64,
        provider_name: String,
    ) -> Self {
        Self {
            pipeline,
            tenants,
            semantic,
            deterministic,
            max_request_size_bytes,
            provider_name,
        }
    }
}
