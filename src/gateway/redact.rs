//! Provider API key redaction for error messages (§7: "Error messages are scrubbed
//! of provider API keys... before being logged or returned").

use std::sync::LazyLock;

use regex::Regex;

const REDACTED: &str = "[REDACTED]";

/// Matches common provider secret shapes so a leaked upstream key never reaches a
/// client response or a log line: OpenAI-style `sk-...` keys, this gateway's own
/// `lgw_{proj,test}_...` credentials, and a bare `Bearer <token>` header value.
static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"sk-[A-Za-z0-9]{16,}",
        r"lgw_(?:proj|test)_[A-Za-z0-9]{32,}",
        r"(?i)\bBearer\s+\S+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("redaction pattern is valid regex"))
    .collect()
});

/// Replaces every recognized secret substring in `message` with a fixed placeholder.
pub fn redact_secrets(message: &str) -> String {
    let mut out = message.to_string();
    for pattern in SECRET_PATTERNS.iter() {
        out = pattern.replace_all(&out, REDACTED).into_owned();
    }
    out
}
