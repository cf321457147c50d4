//! Deterministic in-process provider for tests and for local development without a
//! real upstream (`CACHEWAY_MOCK_PROVIDER=1`; see `main.rs`).

use async_trait::async_trait;
use futures_util::stream;

use super::error::ProviderResult;
use super::types::{EmbeddingResponse, ProviderResponse};
use super::{ByteStream, ProviderClient};
use crate::cache::TokenCounts;
use crate::constants::DEFAULT_EMBEDDING_DIM;
use crate::request::{ChatCompletionRequest, CompletionRequest, EmbeddingsRequest};

/// Always succeeds; echoes the request back into a synthetic completion and a
/// deterministic embedding derived from the input's length, so tests can assert on
/// stable similarity scores without a real model.
pub struct MockProviderClient {
    pub provider_name: String,
}

impl Default for MockProviderClient {
    fn default() -> Self {
        Self {
            provider_name: "mock".to_string(),
        }
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn chat_completion(&self, req: &ChatCompletionRequest) -> ProviderResult<ProviderResponse> {
        let content = req
            .messages
            .last()
            .and_then(|m| m.content.as_deref())
            .unwrap_or("");
        let payload = serde_json::json!({
            "id": "mock-chatcmpl",
            "object": "chat.completion",
            "model": req.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": format!("mock response to: {content}")},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20},
        });
        Ok(ProviderResponse {
            payload,
            tokens: TokenCounts { input: 10, output: 10, total: 20 },
        })
    }

    async fn completion(&self, req: &CompletionRequest) -> ProviderResult<ProviderResponse> {
        let prompt = req.prompt.as_parts().join(" ");
        let payload = serde_json::json!({
            "id": "mock-cmpl",
            "object": "text_completion",
            "model": req.model,
            "choices": [{"index": 0, "text": format!("mock completion for: {prompt}"), "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 5, "total_tokens": 10},
        });
        Ok(ProviderResponse {
            payload,
            tokens: TokenCounts { input: 5, output: 5, total: 10 },
        })
    }

    async fn embeddings(&self, req: &EmbeddingsRequest) -> ProviderResult<EmbeddingResponse> {
        let parts = req.input.as_parts();
        let embeddings = parts
            .iter()
            .map(|text| deterministic_embedding(text, DEFAULT_EMBEDDING_DIM))
            .collect();
        Ok(EmbeddingResponse {
            embeddings,
            tokens: TokenCounts { input: parts.len() as u64, output: 0, total: parts.len() as u64 },
        })
    }

    async fn stream_chat_completion(&self, req: &ChatCompletionRequest) -> ProviderResult<ByteStream> {
        let content = req
            .messages
            .last()
            .and_then(|m| m.content.as_deref())
            .unwrap_or("");
        let chunk = serde_json::json!({
            "id": "mock-chatcmpl-chunk",
            "object": "chat.completion.chunk",
            "model": req.model,
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": format!("mock stream: {content}")}, "finish_reason": null}],
        });
        let done = serde_json::json!({
            "id": "mock-chatcmpl-chunk",
            "object": "chat.completion.chunk",
            "model": req.model,
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
        });

        let lines = vec![
            format!("data: {}\n\n", chunk),
            format!("data: {}\n\n", done),
            "data: [DONE]\n\n".to_string(),
        ];
        let bytes: Vec<ProviderResult<bytes::Bytes>> = lines
            .into_iter()
            .map(|line| Ok(bytes::Bytes::from(line.into_bytes())))
            .collect();
        Ok(Box::pin(stream::iter(bytes)))
    }
}

/// Hash-derived unit vector so identical inputs yield identical embeddings and
/// distinct inputs yield (with overwhelming probability) distinct ones.
fn deterministic_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut seed = crate::hashing::hash_to_u64(text.as_bytes());
    let mut out = Vec::with_capacity(dim);
    for _ in 0..dim {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let v = ((seed >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0;
        out.push(v);
    }
    let norm: f32 = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut out {
            *v /= norm;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_yields_identical_embeddings() {
        let client = MockProviderClient::default();
        let req = EmbeddingsRequest {
            model: "mock-embed".to_string(),
            input: crate::request::EmbeddingInput::Single("hello".to_string()),
            user: None,
            encoding_format: None,
        };
        let a = client.embeddings(&req).await.unwrap();
        let b = client.embeddings(&req).await.unwrap();
        assert_eq!(a.embeddings, b.embeddings);
    }

    #[tokio::test]
    async fn chat_completion_echoes_last_message() {
        let client = MockProviderClient::default();
        let req = ChatCompletionRequest {
            model: "mock-chat".to_string(),
            messages: vec![crate::request::ChatMessage {
                role: crate::request::Role::User,
                content: Some("ping".to_string()),
                name: None,
                function_call: None,
                tool_calls: None,
            }],
            temperature: None,
            max_tokens: None,
            top_p: None,
            n: None,
            stream: None,
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            logit_bias: None,
            user: None,
            functions: None,
            function_call: None,
            tools: None,
            tool_choice: None,
            response_format: None,
            seed: None,
            extra: serde_json::Map::new(),
        };
        let resp = client.chat_completion(&req).await.unwrap();
        let content = resp.payload["choices"][0]["message"]["content"].as_str().unwrap();
        assert!(content.contains("ping"));
    }
}
