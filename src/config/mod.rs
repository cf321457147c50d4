//! Environment configuration.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::{ConfigError, ConfigResult};

use std::env;
use std::net::IpAddr;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_REQUEST_SIZE_BYTES,
    DEFAULT_MAX_RETRIES, DEFAULT_SEMANTIC_THRESHOLD,
};

/// Process-wide configuration, assembled from environment variables with sane defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port.
    pub port: u16,
    /// Listen address.
    pub bind_addr: IpAddr,
    /// Maximum accepted request body size in bytes.
    pub max_request_size_bytes: u64,
    /// Default semantic-cache similarity threshold when a tenant has no override.
    pub semantic_cache_threshold: f32,
    /// Deterministic-cache capacity (number of entries held in the in-process L1 layer).
    pub deterministic_cache_capacity: u64,
    /// Base URL of the upstream OpenAI-compatible provider.
    pub provider_base_url: String,
    /// API key forwarded to the upstream provider, if configured.
    pub provider_api_key: Option<String>,
    /// Model name used for embedding calls.
    pub embedding_model: String,
    /// Observability ingest batch size before a flush is triggered.
    pub observability_batch_size: usize,
    /// Observability ingest flush interval.
    pub observability_flush_interval: std::time::Duration,
    /// Observability ingest max retries before dead-letter routing.
    pub observability_max_retries: u32,
    /// When true, the gateway uses an in-process mock provider instead of calling out over HTTP.
    pub mock_provider: bool,
    /// Environment-level default cache TTL in seconds, used when a tenant has neither an
    /// endpoint override nor its own default.
    pub default_cache_ttl_seconds: u64,
    /// When true, cache-hit stream replay sleeps a flat 30ms per chunk instead of the
    /// recorded inter-arrival delta.
    pub fast_replay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            max_request_size_bytes: DEFAULT_MAX_REQUEST_SIZE_BYTES,
            semantic_cache_threshold: DEFAULT_SEMANTIC_THRESHOLD,
            deterministic_cache_capacity: 10_000,
            provider_base_url: "https://api.openai.com".to_string(),
            provider_api_key: None,
            embedding_model: "text-embedding-3-small".to_string(),
            observability_batch_size: DEFAULT_BATCH_SIZE,
            observability_flush_interval: DEFAULT_FLUSH_INTERVAL,
            observability_max_retries: DEFAULT_MAX_RETRIES,
            mock_provider: false,
            default_cache_ttl_seconds: 3600,
            fast_replay: false,
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "CACHEWAY_PORT";
    const ENV_BIND_ADDR: &'static str = "CACHEWAY_BIND_ADDR";
    const ENV_MAX_REQUEST_SIZE_BYTES: &'static str = "CACHEWAY_MAX_REQUEST_SIZE_BYTES";
    const ENV_SEMANTIC_CACHE_THRESHOLD: &'static str = "SEMANTIC_CACHE_THRESHOLD";
    const ENV_DETERMINISTIC_CACHE_CAPACITY: &'static str = "CACHEWAY_DETERMINISTIC_CACHE_CAPACITY";
    const ENV_PROVIDER_BASE_URL: &'static str = "CACHEWAY_PROVIDER_BASE_URL";
    const ENV_PROVIDER_API_KEY: &'static str = "CACHEWAY_PROVIDER_API_KEY";
    const ENV_EMBEDDING_MODEL: &'static str = "CACHEWAY_EMBEDDING_MODEL";
    const ENV_OBSERVABILITY_BATCH_SIZE: &'static str = "CACHEWAY_OBSERVABILITY_BATCH_SIZE";
    const ENV_OBSERVABILITY_FLUSH_INTERVAL_MS: &'static str =
        "CACHEWAY_OBSERVABILITY_FLUSH_INTERVAL_MS";
    const ENV_OBSERVABILITY_MAX_RETRIES: &'static str = "CACHEWAY_OBSERVABILITY_MAX_RETRIES";
    const ENV_MOCK_PROVIDER: &'static str = "CACHEWAY_MOCK_PROVIDER";
    const ENV_DEFAULT_CACHE_TTL_SECONDS: &'static str = "CACHEWAY_DEFAULT_CACHE_TTL_SECONDS";
    const ENV_FAST_REPLAY: &'static str = "CACHEWAY_FAST_REPLAY";

    /// Loads configuration from the environment, falling back to defaults for unset values.
    pub fn from_env() -> ConfigResult<Self> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let max_request_size_bytes = Self::parse_u64_from_env(
            Self::ENV_MAX_REQUEST_SIZE_BYTES,
            defaults.max_request_size_bytes,
        );
        let semantic_cache_threshold = Self::parse_threshold_from_env(defaults.semantic_cache_threshold)?;
        let deterministic_cache_capacity = Self::parse_u64_from_env(
            Self::ENV_DETERMINISTIC_CACHE_CAPACITY,
            defaults.deterministic_cache_capacity,
        );
        let provider_base_url = Self::parse_string_from_env(
            Self::ENV_PROVIDER_BASE_URL,
            defaults.provider_base_url,
        );
        let provider_api_key = env::var(Self::ENV_PROVIDER_API_KEY).ok();
        let embedding_model =
            Self::parse_string_from_env(Self::ENV_EMBEDDING_MODEL, defaults.embedding_model);
        let observability_batch_size = Self::parse_usize_from_env(
            Self::ENV_OBSERVABILITY_BATCH_SIZE,
            defaults.observability_batch_size,
        );
        let observability_flush_interval = env::var(Self::ENV_OBSERVABILITY_FLUSH_INTERVAL_MS)
            .ok()
            .and_then(|v| v.parse().ok())
            .map(std::time::Duration::from_millis)
            .unwrap_or(defaults.observability_flush_interval);
        let observability_max_retries = env::var(Self::ENV_OBSERVABILITY_MAX_RETRIES)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.observability_max_retries);
        let mock_provider = env::var(Self::ENV_MOCK_PROVIDER)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.mock_provider);
        let default_cache_ttl_seconds = Self::parse_u64_from_env(
            Self::ENV_DEFAULT_CACHE_TTL_SECONDS,
            defaults.default_cache_ttl_seconds,
        );
        let fast_replay = env::var(Self::ENV_FAST_REPLAY)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.fast_replay);

        Ok(Self {
            port,
            bind_addr,
            max_request_size_bytes,
            semantic_cache_threshold,
            deterministic_cache_capacity,
            provider_base_url,
            provider_api_key,
            embedding_model,
            observability_batch_size,
            observability_flush_interval,
            observability_max_retries,
            mock_provider,
            default_cache_ttl_seconds,
            fast_replay,
        })
    }

    /// Validates internal consistency beyond what individual field parsers already enforce.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.50..=0.99).contains(&self.semantic_cache_threshold) {
            return Err(ConfigError::InvalidThreshold {
                value: self.semantic_cache_threshold,
            });
        }

        if !self.provider_base_url.starts_with("http://") && !self.provider_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidProviderUrl {
                value: self.provider_base_url.clone(),
            });
        }

        Ok(())
    }

    /// Returns the socket address string suitable for `TcpListener::bind`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> ConfigResult<u16> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> ConfigResult<IpAddr> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_threshold_from_env(default: f32) -> ConfigResult<f32> {
        match env::var(Self::ENV_SEMANTIC_CACHE_THRESHOLD) {
            Ok(value) => {
                let parsed: f32 = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidThreshold { value: -1.0 })?;
                if !(0.50..=0.99).contains(&parsed) {
                    return Err(ConfigError::InvalidThreshold { value: parsed });
                }
                Ok(parsed)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_u64_from_env(var_name: &str, default: u64) -> u64 {
        env::var(var_name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn parse_usize_from_env(var_name: &str, default: usize) -> usize {
        env::var(var_name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}
