use thiserror::Error;

/// Validation failures for inbound chat/completion requests, surfaced to clients as
/// `invalid_request_error`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("model is required")]
    MissingModel,

    #[error("messages must not be empty")]
    EmptyMessages,

    #[error("temperature must be between 0 and 2, got {value}")]
    TemperatureOutOfRange { value: f32 },

    #[error("max_tokens must be at least 1, got {value}")]
    InvalidMaxTokens { value: u32 },

    #[error("streaming is not supported on this endpoint")]
    StreamingNotSupported,

    #[error("request body could not be parsed: {reason}")]
    MalformedBody { reason: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;
