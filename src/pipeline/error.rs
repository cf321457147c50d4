use thiserror::Error;

use crate::ratelimit::Admission;
use crate::request::ValidationError;

/// Failures surfaced by [`super::RequestPipeline`], one variant per §7 error kind
/// this module can produce. Cache/coalescer/observability failures never reach this
/// type — they are logged and absorbed at the call site, the request proceeds as a
/// miss (see DESIGN.md).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("rate limit exceeded")]
    RateLimited(Admission),

    #[error("monthly quota exceeded")]
    QuotaExceeded(Admission),

    #[error("upstream provider error: {0}")]
    Upstream(#[from] crate::provider::ProviderError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
