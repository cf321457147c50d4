//! Bearer-credential extraction and validation (§6 "Authentication").

use std::sync::LazyLock;

use axum::http::HeaderMap;
use regex::Regex;

use super::error::GatewayError;

static CREDENTIAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^lgw_(proj|test)_[A-Za-z0-9]{32,}$").unwrap());

/// Extracts the credential from `Authorization: Bearer <key>`, or a raw key with no
/// `Bearer` prefix, and checks it against the key format.
pub fn extract_credential(headers: &HeaderMap) -> Result<String, GatewayError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(GatewayError::Unauthenticated)?;

    let credential = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();

    if !CREDENTIAL_PATTERN.is_match(credential) {
        return Err(GatewayError::Unauthenticated);
    }

    Ok(credential.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn accepts_bearer_prefixed_key() {
        let key = "lgw_test_abcdefghijklmnopqrstuvwxyz012345";
        let got = extract_credential(&headers_with(&format!("Bearer {key}"))).unwrap();
        assert_eq!(got, key);
    }

    #[test]
    fn accepts_raw_key_without_bearer_prefix() {
        let key = "lgw_proj_abcdefghijklmnopqrstuvwxyz012345";
        let got = extract_credential(&headers_with(key)).unwrap();
        assert_eq!(got, key);
    }

    #[test]
    fn rejects_malformed_key() {
        assert!(extract_credential(&headers_with("Bearer not-a-valid-key")).is_err());
    }

    #[test]
    fn rejects_missing_header() {
        assert!(extract_credential(&HeaderMap::new()).is_err());
    }
}
