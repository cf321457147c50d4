//! Wire-level response shapes returned by a [`super::ProviderClient`].
//!
//! The upstream JSON body is kept as an opaque [`serde_json::Value`] rather than
//! re-modeled field-by-field; only the `usage` block is pulled out into
//! [`TokenCounts`] since the pipeline needs token counts independent of the response
//! shape to compute `X-Tokens-Saved`.

use serde_json::Value;

use crate::cache::TokenCounts;
use crate::provider::error::ProviderError;

/// A complete (non-streaming) chat/completion response from the provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub payload: Value,
    pub tokens: TokenCounts,
}

/// An embeddings response: one vector per input string, in request order.
#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub tokens: TokenCounts,
}

/// Extracts `{prompt_tokens, completion_tokens, total_tokens}` from an OpenAI-shaped
/// `usage` object, defaulting absent fields to zero rather than failing the request —
/// a malformed usage block should not turn a successful upstream call into an error.
pub fn token_counts_from_usage(payload: &Value) -> TokenCounts {
    let usage = payload.get("usage");
    let field = |name: &str| -> u64 {
        usage
            .and_then(|u| u.get(name))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let input = field("prompt_tokens");
    let output = field("completion_tokens");
    let total = usage
        .and_then(|u| u.get("total_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(input + output);
    TokenCounts { input, output, total }
}

pub(super) fn embeddings_from_payload(payload: &Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or(ProviderError::MalformedResponse("data"))?;

    data.iter()
        .map(|item| {
            item.get("embedding")
                .and_then(Value::as_array)
                .ok_or(ProviderError::MalformedResponse("embedding"))
                .map(|vec| {
                    vec.iter()
                        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                        .collect()
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_counts_default_to_zero_when_usage_missing() {
        let payload = serde_json::json!({"id": "x"});
        let counts = token_counts_from_usage(&payload);
        assert_eq!(counts, TokenCounts::default());
    }

    #[test]
    fn token_counts_reads_usage_block() {
        let payload = serde_json::json!({
            "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
        });
        let counts = token_counts_from_usage(&payload);
        assert_eq!(counts, TokenCounts { input: 3, output: 5, total: 8 });
    }

    #[test]
    fn embeddings_from_payload_extracts_vectors_in_order() {
        let payload = serde_json::json!({
            "data": [
                {"embedding": [1.0, 2.0]},
                {"embedding": [3.0, 4.0]},
            ]
        });
        let vectors = embeddings_from_payload(&payload).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }
}
