use thiserror::Error;

/// Failures calling the upstream OpenAI-compatible provider: HTTP errors, timeouts,
/// and stream interruptions.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("provider response could not be parsed: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("provider response was missing the `{0}` field")]
    MalformedResponse(&'static str),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
