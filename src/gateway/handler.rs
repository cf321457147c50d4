//! Endpoint handlers (§6).

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::cache::InvalidationFilter;
use crate::pricing::known_models;
use crate::request::{ChatCompletionRequest, CompletionRequest, EmbeddingsRequest, RequestKind};

use super::auth::extract_credential;
use super::error::GatewayError;
use super::state::AppState;
use crate::pipeline::{PipelineBody, PipelineResponse, RequestContext};

async fn resolve_tenant(state: &AppState, headers: &HeaderMap) -> Result<crate::tenant::Tenant, GatewayError> {
    let credential = extract_credential(headers)?;
    state.tenants.resolve(&credential).ok_or(GatewayError::UnknownTenant)
}

/// Rejects the request before parsing if the declared or actual body size exceeds
/// the tenant-independent `MAX_REQUEST_SIZE_BYTES` bound (§6).
fn enforce_body_size(headers: &HeaderMap, body: &Bytes, max_bytes: u64) -> Result<(), GatewayError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    if declared.is_some_and(|len| len > max_bytes) || body.len() as u64 > max_bytes {
        return Err(GatewayError::PayloadTooLarge);
    }
    Ok(())
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    serde_json::from_slice(body).map_err(|e| GatewayError::MalformedJson(e.to_string()))
}

fn response_headers(request_id: &str, meta_latency_ms: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::HeaderName::from_static("x-request-id"),
        HeaderValue::from_str(request_id).unwrap_or(HeaderValue::from_static("unknown")),
    );
    headers.insert(
        header::HeaderName::from_static("server-timing"),
        HeaderValue::from_str(&format!("total;dur={meta_latency_ms}"))
            .unwrap_or(HeaderValue::from_static("total;dur=0")),
    );
    headers
}

fn apply_pipeline_meta(headers: &mut HeaderMap, response: &PipelineResponse) {
    let meta = &response.meta;
    headers.insert(
        header::HeaderName::from_static("x-cache"),
        HeaderValue::from_static(meta.cache_status.as_header_value()),
    );
    headers.insert(
        header::HeaderName::from_static("x-provider"),
        HeaderValue::from_str(&meta.provider).unwrap_or(HeaderValue::from_static("unknown")),
    );
    headers.insert(
        header::HeaderName::from_static("x-latency-ms"),
        HeaderValue::from_str(&meta.latency_ms.to_string()).unwrap_or(HeaderValue::from_static("0")),
    );
    if let Some(age) = meta.cache_age_secs {
        headers.insert(
            header::HeaderName::from_static("x-cache-age"),
            HeaderValue::from_str(&age.to_string()).unwrap_or(HeaderValue::from_static("0")),
        );
    }
    if let Some(tokens_saved) = meta.tokens_saved {
        headers.insert(
            header::HeaderName::from_static("x-tokens-saved"),
            HeaderValue::from_str(&tokens_saved.to_string()).unwrap_or(HeaderValue::from_static("0")),
        );
    }
    if let Some(similarity) = meta.similarity {
        headers.insert(
            header::HeaderName::from_static("x-cache-similarity"),
            HeaderValue::from_str(&format!("{similarity:.4}")).unwrap_or(HeaderValue::from_static("0")),
        );
    }
    if let Some(cost) = meta.cost_usd {
        headers.insert(
            header::HeaderName::from_static("x-cost-usd"),
            HeaderValue::from_str(&format!("{cost:.6}")).unwrap_or(HeaderValue::from_static("0")),
        );
    }

    super::error::apply_admission_headers(headers, &meta.admission);
}

fn into_http_response(response: PipelineResponse) -> Response {
    let mut headers = response_headers(&response.meta.request_id, response.meta.latency_ms);
    apply_pipeline_meta(&mut headers, &response);

    match response.body {
        PipelineBody::Json(payload) => (StatusCode::OK, headers, Json(payload)).into_response(),
        PipelineBody::Stream(stream) => {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
            let body = Body::from_stream(stream);
            (StatusCode::OK, headers, body).into_response()
        }
    }
}

#[instrument(skip(state, headers, body), fields(endpoint = "/v1/chat/completions"))]
pub async fn chat_completions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    enforce_body_size(&headers, &body, state.max_request_size_bytes)?;
    let tenant = resolve_tenant(&state, &headers).await?;
    let req: ChatCompletionRequest = parse_json(&body)?;

    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
        tenant,
        endpoint: "/v1/chat/completions",
    };
    let response = state.pipeline.handle_chat(ctx, req).await?;
    Ok(into_http_response(response))
}

#[instrument(skip(state, headers, body), fields(endpoint = "/v1/completions"))]
pub async fn completions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    enforce_body_size(&headers, &body, state.max_request_size_bytes)?;
    let tenant = resolve_tenant(&state, &headers).await?;
    let req: CompletionRequest = parse_json(&body)?;

    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
        tenant,
        endpoint: "/v1/completions",
    };
    let response = state.pipeline.handle_completion(ctx, req).await?;
    Ok(into_http_response(response))
}

#[instrument(skip(state, headers, body), fields(endpoint = "/v1/embeddings"))]
pub async fn embeddings_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    enforce_body_size(&headers, &body, state.max_request_size_bytes)?;
    let tenant = resolve_tenant(&state, &headers).await?;
    let req: EmbeddingsRequest = parse_json(&body)?;

    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
        tenant,
        endpoint: "/v1/embeddings",
    };
    let response = state.pipeline.handle_embeddings(ctx, req).await?;
    Ok(into_http_response(response))
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    model: Option<String>,
    endpoint: Option<String>,
    before_date: Option<DateTime<Utc>>,
    after_date: Option<DateTime<Utc>>,
    min_similarity: Option<f32>,
    max_similarity: Option<f32>,
}

#[derive(Debug, serde::Serialize)]
pub struct InvalidateResponse {
    success: bool,
    entries_invalidated: usize,
    message: String,
}

#[instrument(skip(state, headers, body), fields(endpoint = "/v1/cache/invalidate"))]
pub async fn invalidate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    enforce_body_size(&headers, &body, state.max_request_size_bytes)?;
    let tenant = resolve_tenant(&state, &headers).await?;
    let body: InvalidateRequest = parse_json(&body)?;

    if body.model.is_none()
        && body.endpoint.is_none()
        && body.before_date.is_none()
        && body.after_date.is_none()
        && body.min_similarity.is_none()
        && body.max_similarity.is_none()
    {
        return Err(GatewayError::InvalidInvalidationFilter(
            "at least one filter is required".to_string(),
        ));
    }

    if let (Some(min), Some(max)) = (body.min_similarity, body.max_similarity)
        && min > max
    {
        return Err(GatewayError::InvalidInvalidationFilter(
            "min_similarity must not exceed max_similarity".to_string(),
        ));
    }

    let kind = match body.endpoint.as_deref() {
        Some("/v1/chat/completions") => Some(RequestKind::Chat),
        Some("/v1/completions") => Some(RequestKind::Completion),
        Some(other) => {
            return Err(GatewayError::InvalidInvalidationFilter(format!(
                "unrecognized endpoint filter: {other}"
            )));
        }
        None => None,
    };

    let filter = InvalidationFilter {
        model: body.model,
        kind,
        created_before: body.before_date,
        created_after: body.after_date,
        min_similarity: body.min_similarity,
        max_similarity: body.max_similarity,
    };

    // Both caches can independently hold an entry for the same logical request (an
    // exact repeat lands in the deterministic cache before any embedding is ever
    // computed for it), so a single filter is applied to each store in turn.
    let removed =
        state.semantic.invalidate(&tenant.id, &filter) + state.deterministic.invalidate(&tenant.id, &filter);

    Ok(Json(InvalidateResponse {
        success: true,
        entries_invalidated: removed,
        message: format!("invalidated {removed} cache entr{}", if removed == 1 { "y" } else { "ies" }),
    })
    .into_response())
}

#[derive(Debug, serde::Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    owned_by: &'static str,
}

#[derive(Debug, serde::Serialize)]
struct ModelsResponse {
    object: &'static str,
    data: Vec<ModelEntry>,
}

#[instrument(skip(headers))]
pub async fn models_handler(headers: HeaderMap, State(state): State<AppState>) -> Result<Response, GatewayError> {
    resolve_tenant(&state, &headers).await?;

    let data = known_models()
        .iter()
        .map(|id| ModelEntry {
            id: id.to_string(),
            object: "model",
            owned_by: "cacheway",
        })
        .collect();

    Ok(Json(ModelsResponse { object: "list", data }).into_response())
}

#[derive(Debug, serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[instrument]
pub async fn health_handler() -> Response {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}

#[derive(Debug, serde::Serialize)]
struct DependencyStatus {
    status: &'static str,
}

#[derive(Debug, serde::Serialize)]
struct DetailedHealthResponse {
    status: &'static str,
    dependencies: std::collections::BTreeMap<&'static str, DependencyStatus>,
}

#[instrument(skip(state))]
pub async fn health_detailed_handler(State(state): State<AppState>) -> Response {
    let mut dependencies = std::collections::BTreeMap::new();
    dependencies.insert("deterministic_cache", DependencyStatus { status: "ready" });
    dependencies.insert("semantic_cache", DependencyStatus { status: "ready" });
    dependencies.insert(
        "provider",
        DependencyStatus {
            status: if state.provider_name.is_empty() { "unconfigured" } else { "ready" },
        },
    );

    let healthy = dependencies.values().all(|d| d.status == "ready");
    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(DetailedHealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            dependencies,
        }),
    )
        .into_response()
}
