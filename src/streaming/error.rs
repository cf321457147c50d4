use thiserror::Error;

/// Failures specific to the stream tee/replay pipeline.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("upstream stream failed: {0}")]
    Upstream(#[from] crate::provider::ProviderError),
}
