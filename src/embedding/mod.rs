//! Embedding generation for the semantic cache.
//!
//! A thin wrapper around [`crate::provider::ProviderClient::embeddings`]: embeddings
//! are obtained by calling the upstream provider's embeddings endpoint with a
//! configured model, not by running a model in-process.

mod error;

pub use error::EmbeddingError;

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::provider::ProviderClient;
use crate::request::{EmbeddingInput, EmbeddingsRequest};

/// Produces an embedding vector for a piece of text, backed by the configured
/// upstream provider. Embedding failures are non-fatal at the call site — callers
/// should treat `Err` as "skip the semantic cache for this request", not as a
/// request failure.
pub struct Embedder {
    provider: Arc<dyn ProviderClient>,
    model: String,
}

impl Embedder {
    pub fn new(provider: Arc<dyn ProviderClient>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    #[instrument(skip(self, text), fields(model = %self.model))]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let req = EmbeddingsRequest {
            model: self.model.clone(),
            input: EmbeddingInput::Single(text.to_string()),
            user: None,
            encoding_format: None,
        };

        let response = self.provider.embeddings(&req).await.map_err(|e| {
            warn!(error = %e, "embedding request failed");
            EmbeddingError::ProviderFailed(e.to_string())
        })?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProviderClient;

    #[tokio::test]
    async fn embed_returns_a_vector_for_mock_provider() {
        let embedder = Embedder::new(Arc::new(MockProviderClient::default()), "mock-embed");
        let vector = embedder.embed("hello world").await.unwrap();
        assert!(!vector.is_empty());
    }

    #[tokio::test]
    async fn embed_is_deterministic_for_identical_text() {
        let embedder = Embedder::new(Arc::new(MockProviderClient::default()), "mock-embed");
        let a = embedder.embed("same text").await.unwrap();
        let b = embedder.embed("same text").await.unwrap();
        assert_eq!(a, b);
    }
}
