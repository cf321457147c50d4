use thiserror::Error;

/// Failures producing an embedding for semantic-cache lookups. Always treated as a
/// non-fatal miss by callers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider call failed: {0}")]
    ProviderFailed(String),

    #[error("embedding provider returned no vectors")]
    EmptyResponse,
}
