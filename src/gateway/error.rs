//! Error envelope mapping for the HTTP surface (§6, §7).

use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::pipeline::PipelineError;
use crate::ratelimit::Admission;

use super::redact::redact_secrets;

/// Failures that can occur before or outside [`PipelineError`]'s scope: auth,
/// request-size enforcement, and malformed JSON bodies.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing or malformed Authorization header")]
    Unauthenticated,

    #[error("unknown API key")]
    UnknownTenant,

    #[error("request body exceeds the configured size limit")]
    PayloadTooLarge,

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("invalid cache invalidation filter: {0}")]
    InvalidInvalidationFilter(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    code: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            GatewayError::Unauthenticated | GatewayError::UnknownTenant => {
                (StatusCode::UNAUTHORIZED, "invalid_request_error")
            }
            GatewayError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "invalid_request_error"),
            GatewayError::MalformedJson(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            GatewayError::InvalidInvalidationFilter(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error")
            }
            GatewayError::Pipeline(e) => match e {
                PipelineError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
                PipelineError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
                PipelineError::QuotaExceeded(_) => (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded_error"),
                PipelineError::Upstream(_) => (StatusCode::BAD_GATEWAY, "api_error"),
                PipelineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "api_error"),
            },
        };

        let mut headers = HeaderMap::new();
        let admission = match &self {
            GatewayError::Pipeline(PipelineError::RateLimited(admission))
            | GatewayError::Pipeline(PipelineError::QuotaExceeded(admission)) => Some(admission),
            _ => None,
        };
        if let Some(admission) = admission {
            apply_admission_headers(&mut headers, admission);
            if let Some(retry_after) = admission.retry_after_secs {
                headers.insert(
                    header::RETRY_AFTER,
                    HeaderValue::from_str(&retry_after.to_string()).unwrap_or(HeaderValue::from_static("60")),
                );
            }
        }

        // Internal-error bodies are sanitized rather than echoing the raw cause
        // (§7); the original is still available to whoever logged it via `?`/`tracing`.
        let message = match &self {
            GatewayError::Pipeline(PipelineError::Internal(_)) => {
                "an internal error occurred".to_string()
            }
            other => redact_secrets(&other.to_string()),
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "request rejected");
        }

        let body = Json(ErrorBody {
            error: ErrorDetail {
                message,
                kind,
                code: status.as_u16().to_string(),
            },
        });

        (status, headers, body).into_response()
    }
}

/// Sets `X-RateLimit-*`/`X-Quota-*` on a response — §4.2 requires these on both
/// success and denial, not just `Retry-After`. Shared with the success path in
/// `handler.rs`.
pub(super) fn apply_admission_headers(headers: &mut HeaderMap, admission: &Admission) {
    headers.insert(
        header::HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from_str(&admission.limit_per_minute.to_string()).unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        header::HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from_str(&admission.remaining_per_minute.to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        header::HeaderName::from_static("x-ratelimit-reset"),
        HeaderValue::from_str(&admission.minute_reset_at.timestamp().to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        header::HeaderName::from_static("x-quota-limit"),
        HeaderValue::from_str(&admission.quota_limit.to_string()).unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        header::HeaderName::from_static("x-quota-remaining"),
        HeaderValue::from_str(&admission.quota_remaining.to_string()).unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        header::HeaderName::from_static("x-quota-reset"),
        HeaderValue::from_str(&admission.quota_reset_at.timestamp().to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
}
