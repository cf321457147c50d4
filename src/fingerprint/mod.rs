//! Request fingerprinting and embedding-input extraction.
//!
//! `fingerprint` and `embedding_input` are pure functions over the same normalized
//! view of a request. Two requests that agree on every field hashed below produce
//! identical fingerprints.

use blake3::Hasher;
use serde_json::Value;

use crate::hashing::hash_to_u64;
use crate::normalize::normalize_message;
use crate::request::AnyRequest;

/// Computes the deterministic request fingerprint.
///
/// Hashes, in order: tenant ID, lowercased model name, the embedding input (normalized
/// message/prompt concatenation), temperature to two decimals, and seed/stop/
/// response_format/functions/tools/tool_choice serialized with sorted keys.
pub fn fingerprint(req: &AnyRequest, tenant_id: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(req.model().to_lowercase().as_bytes());
    hasher.update(b"\0");
    hasher.update(embedding_input(req).as_bytes());
    hasher.update(b"\0");
    hasher.update(format!("{:.2}", req.temperature()).as_bytes());
    hasher.update(b"\0");

    for field in [
        req.seed().map(Value::from),
        req.stop().cloned(),
        req.response_format().cloned(),
        req.functions().cloned(),
        req.tools().cloned(),
        req.tool_choice().cloned(),
    ] {
        hasher.update(canonical_json(field.as_ref()).as_bytes());
        hasher.update(b"\0");
    }

    hasher.finalize().to_hex().to_string()
}

/// Builds the text fed to the embedding model for semantic-cache lookups.
///
/// For chat requests this is the normalized `role:content` pairs joined in message
/// order; for completion requests it is the normalized prompt(s).
pub fn embedding_input(req: &AnyRequest) -> String {
    match req {
        AnyRequest::Chat(_) => req
            .messages()
            .iter()
            .map(|m| normalize_message(m.role.as_str(), m.content.as_deref().unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\n"),
        AnyRequest::Completion(_) => req
            .prompts()
            .iter()
            .map(|p| crate::normalize::normalize(p))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Computes the context hash — a short digest over the fields that must match
/// exactly for a semantic-cache hit to be legal: tools, tool_choice, response_format,
/// seed, and the system-role message verbatim.
pub fn context_hash(req: &AnyRequest) -> String {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(canonical_json(req.tools()).as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(canonical_json(req.tool_choice()).as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(canonical_json(req.response_format()).as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(canonical_json(req.seed().map(Value::from).as_ref()).as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(req.system_message().unwrap_or("").as_bytes());

    format!("{:016x}", hash_to_u64(&bytes))
}

/// Scopes a semantic-cache bucket to a model and context.
pub fn bucket_key(model: &str, context_hash: &str) -> String {
    format!("{}:{}", model.to_lowercase(), context_hash)
}

fn canonical_json(value: Option<&Value>) -> String {
    match value {
        // `serde_json::Map` is a `BTreeMap` by default (no `preserve_order` feature),
        // so `to_string` already yields sorted keys.
        Some(v) => serde_json::to_string(v).unwrap_or_else(|_| "null".to_string()),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ChatCompletionRequest, ChatMessage, Role};
    use serde_json::Map;

    fn chat(model: &str, content: &str, temperature: Option<f32>) -> AnyRequest {
        AnyRequest::Chat(ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: Some(content.to_string()),
                name: None,
                function_call: None,
                tool_calls: None,
            }],
            temperature,
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
            extra: Map::new(),
        })
    }

    #[test]
    fn identical_requests_fingerprint_identically() {
        let a = chat("gpt-4o", "Hello", Some(0.5));
        let b = chat("gpt-4o", "Hello", Some(0.5));
        assert_eq!(fingerprint(&a, "tenant-1"), fingerprint(&b, "tenant-1"));
    }

    #[test]
    fn differing_tenants_fingerprint_differently() {
        let a = chat("gpt-4o", "Hello", Some(0.5));
        assert_ne!(
            fingerprint(&a, "tenant-1"),
            fingerprint(&a, "tenant-2")
        );
    }

    #[test]
    fn whitespace_and_filler_differences_collapse() {
        let a = chat("gpt-4o", "What's 5 times 3?", Some(0.5));
        let b = chat("gpt-4o", "please tell me what's  5 times 3?", Some(0.5));
        assert_eq!(fingerprint(&a, "tenant-1"), fingerprint(&b, "tenant-1"));
    }

    #[test]
    fn model_case_is_insensitive() {
        let a = chat("GPT-4O", "Hello", Some(0.5));
        let b = chat("gpt-4o", "Hello", Some(0.5));
        assert_eq!(fingerprint(&a, "tenant-1"), fingerprint(&b, "tenant-1"));
    }

    #[test]
    fn context_hash_differs_when_tools_present() {
        let mut with_tools = match chat("gpt-4o", "hi", None) {
            AnyRequest::Chat(r) => r,
            _ => unreachable!(),
        };
        let without = AnyRequest::Chat(with_tools.clone());
        with_tools.tools = Some(serde_json::json!([{"type": "function"}]));
        let with_tools = AnyRequest::Chat(with_tools);

        assert_ne!(context_hash(&with_tools), context_hash(&without));
    }
}
