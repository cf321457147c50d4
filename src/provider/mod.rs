//! Upstream OpenAI-compatible provider client.
//!
//! Since the upstream already speaks the OpenAI wire format, there is no cross-
//! provider request/response adaptation here, only a thin HTTP client behind a trait
//! so tests can substitute [`MockProviderClient`].

mod error;
mod types;
mod mock;

pub use error::{ProviderError, ProviderResult};
pub use types::{EmbeddingResponse, ProviderResponse, token_counts_from_usage};
pub use mock::MockProviderClient;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::request::{ChatCompletionRequest, CompletionRequest, EmbeddingsRequest};
use types::embeddings_from_payload;

/// A stream of raw response bytes from an upstream SSE body, as delivered by
/// `reqwest`'s `bytes_stream`. The streaming module is responsible for buffering
/// partial lines and parsing `data: ...` frames.
pub type ByteStream = Pin<Box<dyn Stream<Item = ProviderResult<Bytes>> + Send>>;

/// The interface the request pipeline needs from an upstream LLM provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// A short identifier used for the `X-Provider` response header.
    fn name(&self) -> &str;

    async fn chat_completion(
        &self,
        req: &ChatCompletionRequest,
    ) -> ProviderResult<ProviderResponse>;

    async fn completion(&self, req: &CompletionRequest) -> ProviderResult<ProviderResponse>;

    async fn embeddings(&self, req: &EmbeddingsRequest) -> ProviderResult<EmbeddingResponse>;

    /// Opens a streaming chat completion; returns the raw SSE byte stream
    /// unmodified, forwarded to the client in the order it arrives.
    async fn stream_chat_completion(&self, req: &ChatCompletionRequest) -> ProviderResult<ByteStream>;
}

/// HTTP implementation calling a configured OpenAI-compatible base URL.
pub struct HttpProviderClient {
    client: Client,
    base_url: String,
    api_key: String,
    provider_name: String,
}

impl HttpProviderClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, provider_name: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            provider_name: provider_name.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> ProviderResult<serde_json::Value> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn name(&self) -> &str {
        &self.provider_name
    }

    #[instrument(skip(self, req), fields(model = %req.model))]
    async fn chat_completion(&self, req: &ChatCompletionRequest) -> ProviderResult<ProviderResponse> {
        let body = serde_json::to_value(req)?;
        let payload = self.post_json("chat/completions", &body).await?;
        let tokens = token_counts_from_usage(&payload);
        debug!(?tokens, "chat completion served");
        Ok(ProviderResponse { payload, tokens })
    }

    #[instrument(skip(self, req), fields(model = %req.model))]
    async fn completion(&self, req: &CompletionRequest) -> ProviderResult<ProviderResponse> {
        let body = serde_json::to_value(req)?;
        let payload = self.post_json("completions", &body).await?;
        let tokens = token_counts_from_usage(&payload);
        Ok(ProviderResponse { payload, tokens })
    }

    #[instrument(skip(self, req), fields(model = %req.model))]
    async fn embeddings(&self, req: &EmbeddingsRequest) -> ProviderResult<EmbeddingResponse> {
        let body = serde_json::to_value(req)?;
        let payload = self.post_json("embeddings", &body).await?;
        let tokens = token_counts_from_usage(&payload);
        let embeddings = embeddings_from_payload(&payload)?;
        Ok(EmbeddingResponse { embeddings, tokens })
    }

    #[instrument(skip(self, req), fields(model = %req.model))]
    async fn stream_chat_completion(&self, req: &ChatCompletionRequest) -> ProviderResult<ByteStream> {
        let mut req = req.clone();
        req.stream = Some(true);
        let body = serde_json::to_value(&req)?;

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        use futures_util::StreamExt;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ProviderError::from));
        Ok(Box::pin(stream))
    }
}
