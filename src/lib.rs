//! # Cacheway
//!
//! Cost-optimizing caching gateway for OpenAI-compatible LLM providers.
//!
//! Cacheway sits between a client and an upstream chat/completions/embeddings API,
//! serving repeat and near-duplicate requests out of an in-process cache instead of
//! paying for another upstream call.
//!
//! ```text
//! Client → [auth, rate limit] → deterministic cache → semantic cache → coalescer → Provider
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cacheway::config::Config;
//!
//! # fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Listening on {}", config.socket_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `mock`  | Enables the in-process mock provider in dev-dependencies |
//!
//! ## Modules
//!
//! - [`cache`] - deterministic, semantic, and stream-replay caches
//! - [`coalescer`] - single-flight request coalescing for concurrent identical requests
//! - [`config`] - environment-backed configuration
//! - [`embedding`] - embedding-model client used to drive the semantic cache
//! - [`fingerprint`] - request fingerprinting and bucket-key derivation
//! - [`gateway`] - Axum router, handlers, and app state
//! - [`observability`] - async usage-event ingest
//! - [`pipeline`] - the request state machine wiring every component together
//! - [`pricing`] - static per-model USD pricing
//! - [`provider`] - upstream OpenAI-compatible provider client
//! - [`ratelimit`] - sliding-window rate limiting and monthly quotas
//! - [`request`] - wire request types shared across `/v1/*` endpoints
//! - [`shared_store`] - shared key-value store abstraction backing rate limits and coalescing
//! - [`streaming`] - SSE tee-and-replay
//! - [`tenant`] - tenant records and plan tiers

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cache;
pub mod coalescer;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod fingerprint;
pub mod gateway;
pub mod hashing;
pub mod normalize;
pub mod observability;
pub mod pipeline;
pub mod pricing;
pub mod provider;
pub mod ratelimit;
pub mod request;
pub mod shared_store;
pub mod streaming;
pub mod tenant;
