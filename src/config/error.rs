//! Configuration error types.

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Port value is outside valid range (1-65535).
    #[error("invalid port '{value}': must be between 1 and 65535")]
    InvalidPort { value: String },

    /// Port string could not be parsed as a number.
    #[error("failed to parse port '{value}': {source}")]
    PortParseError {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// Bind address string could not be parsed.
    #[error("failed to parse bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// The global semantic-cache threshold default is outside `[0.50, 0.99]`.
    #[error("invalid semantic cache threshold '{value}': must be between 0.50 and 0.99")]
    InvalidThreshold { value: f32 },

    /// The configured upstream provider base URL failed to parse.
    #[error("invalid provider base url '{value}'")]
    InvalidProviderUrl { value: String },
}

/// Convenience result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
