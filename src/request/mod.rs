//! Typed request variants for the three OpenAI-compatible endpoints.
//!
//! Requests are modeled as tagged variants with explicit optional fields rather than
//! untyped `serde_json::Value` maps in the hot path. Unknown fields are tolerated via
//! a `#[serde(flatten)]` catch-all bag instead of rejecting the request.

mod error;

pub use error::{ValidationError, ValidationResult};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
    Tool,
}

impl Role {
    /// Returns the wire string for this role, used as the fingerprint's structural
    /// separator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
            Role::Tool => "tool",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

/// `prompt` accepts either a single string or a list of strings (OpenAI completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    Single(String),
    Many(Vec<String>),
}

impl PromptInput {
    /// Returns each prompt string in order.
    pub fn as_parts(&self) -> Vec<&str> {
        match self {
            PromptInput::Single(s) => vec![s.as_str()],
            PromptInput::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// `input` accepts either a single string or a list of strings (OpenAI embeddings).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Many(Vec<String>),
}

impl EmbeddingInput {
    pub fn as_parts(&self) -> Vec<&str> {
        match self {
            EmbeddingInput::Single(s) => vec![s.as_str()],
            EmbeddingInput::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// `POST /v1/chat/completions` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `POST /v1/completions` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: PromptInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `POST /v1/embeddings` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsRequest {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

/// The kind of cacheable request, used to scope the semantic cache per tenant and
/// per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Chat,
    Completion,
}

/// Either a chat or a completion request, unified for the fingerprint/pipeline code
/// paths that do not care which endpoint originated the request.
#[derive(Debug, Clone)]
pub enum AnyRequest {
    Chat(ChatCompletionRequest),
    Completion(CompletionRequest),
}

impl AnyRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            AnyRequest::Chat(_) => RequestKind::Chat,
            AnyRequest::Completion(_) => RequestKind::Completion,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            AnyRequest::Chat(r) => &r.model,
            AnyRequest::Completion(r) => &r.model,
        }
    }

    pub fn is_streaming(&self) -> bool {
        match self {
            AnyRequest::Chat(r) => r.stream.unwrap_or(false),
            AnyRequest::Completion(r) => r.stream.unwrap_or(false),
        }
    }

    pub fn temperature(&self) -> f32 {
        match self {
            AnyRequest::Chat(r) => r.temperature.unwrap_or(1.0),
            AnyRequest::Completion(r) => r.temperature.unwrap_or(1.0),
        }
    }

    pub fn seed(&self) -> Option<i64> {
        match self {
            AnyRequest::Chat(r) => r.seed,
            AnyRequest::Completion(r) => r.seed,
        }
    }

    pub fn stop(&self) -> Option<&Value> {
        match self {
            AnyRequest::Chat(r) => r.stop.as_ref(),
            AnyRequest::Completion(r) => r.stop.as_ref(),
        }
    }

    pub fn response_format(&self) -> Option<&Value> {
        match self {
            AnyRequest::Chat(r) => r.response_format.as_ref(),
            AnyRequest::Completion(_) => None,
        }
    }

    pub fn functions(&self) -> Option<&Value> {
        match self {
            AnyRequest::Chat(r) => r.functions.as_ref(),
            AnyRequest::Completion(_) => None,
        }
    }

    pub fn tools(&self) -> Option<&Value> {
        match self {
            AnyRequest::Chat(r) => r.tools.as_ref(),
            AnyRequest::Completion(_) => None,
        }
    }

    pub fn tool_choice(&self) -> Option<&Value> {
        match self {
            AnyRequest::Chat(r) => r.tool_choice.as_ref(),
            AnyRequest::Completion(_) => None,
        }
    }

    /// The verbatim system-role message content, if any (an input to the context hash).
    pub fn system_message(&self) -> Option<&str> {
        match self {
            AnyRequest::Chat(r) => r
                .messages
                .iter()
                .find(|m| matches!(m.role, Role::System))
                .and_then(|m| m.content.as_deref()),
            AnyRequest::Completion(_) => None,
        }
    }

    /// `(role, content)` pairs in order, for chat requests; empty for completions.
    pub fn messages(&self) -> &[ChatMessage] {
        match self {
            AnyRequest::Chat(r) => &r.messages,
            AnyRequest::Completion(_) => &[],
        }
    }

    /// The prompt string(s), for completion requests; empty for chats.
    pub fn prompts(&self) -> Vec<&str> {
        match self {
            AnyRequest::Chat(_) => Vec::new(),
            AnyRequest::Completion(r) => r.prompt.as_parts(),
        }
    }

    /// Validates the sampling fields honored by the upstream provider.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.model().trim().is_empty() {
            return Err(ValidationError::MissingModel);
        }
        let temp = match self {
            AnyRequest::Chat(r) => r.temperature,
            AnyRequest::Completion(r) => r.temperature,
        };
        if let Some(t) = temp
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ValidationError::TemperatureOutOfRange { value: t });
        }
        let max_tokens = match self {
            AnyRequest::Chat(r) => r.max_tokens,
            AnyRequest::Completion(r) => r.max_tokens,
        };
        if let Some(m) = max_tokens
            && m < 1
        {
            return Err(ValidationError::InvalidMaxTokens { value: m });
        }
        match self {
            AnyRequest::Chat(r) if r.messages.is_empty() => return Err(ValidationError::EmptyMessages),
            AnyRequest::Completion(r) if r.stream.unwrap_or(false) => {
                return Err(ValidationError::StreamingNotSupported);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_land_in_extra() {
        let raw = serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "some_future_field": true,
        });
        let req: ChatCompletionRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.extra.get("some_future_field").unwrap(), true);
    }

    #[test]
    fn validates_temperature_range() {
        let mut req = ChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: Some("hi".to_string()),
                name: None,
                function_call: None,
                tool_calls: None,
            }],
            temperature: Some(3.0),
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
        };
        assert!(matches!(
            AnyRequest::Chat(req.clone()).validate(),
            Err(ValidationError::TemperatureOutOfRange { .. })
        ));
        req.temperature = Some(0.5);
        assert!(AnyRequest::Chat(req).validate().is_ok());
    }
}
