use thiserror::Error;

/// Errors surfaced by rate/quota admission.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateLimitError {
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("monthly quota exceeded, resets {reset_at}")]
    QuotaExceeded { reset_at: String },
}

pub type RateLimitResult<T> = Result<T, RateLimitError>;
