//! Router-level tests for the gateway handlers, exercised in-process with
//! `tower::ServiceExt::oneshot` against a full [`AppState`] built on in-memory
//! components and the mock provider.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use crate::cache::{DeterministicCache, SemanticCache, StreamCache};
use crate::coalescer::Coalescer;
use crate::embedding::Embedder;
use crate::observability::{InMemoryAnalyticsSink, InMemoryDeadLetterSink, IngestPipeline};
use crate::pipeline::RequestPipeline;
use crate::provider::{MockProviderClient, ProviderClient};
use crate::ratelimit::RateLimiter;
use crate::shared_store::InMemorySharedStore;
use crate::tenant::{InMemoryTenantRegistry, Plan, Tenant};

use super::state::AppState;

const TEST_KEY: &str = "lgw_test_abcdefghijklmnopqrstuvwxyz012345";

fn test_router() -> Router {
    let store = Arc::new(InMemorySharedStore::new());
    let rate_limiter = RateLimiter::new(store.clone());
    let coalescer = Coalescer::new(store);

    let deterministic = Arc::new(DeterministicCache::with_capacity(100));
    let semantic = Arc::new(SemanticCache::with_capacity(50));
    let stream_cache = Arc::new(StreamCache::with_capacity(100));

    let provider: Arc<dyn ProviderClient> = Arc::new(MockProviderClient::default());
    let embedder = Arc::new(Embedder::new(provider.clone(), "text-embedding-3-small"));

    let ingest = Arc::new(IngestPipeline::new(
        Arc::new(InMemoryAnalyticsSink::new()),
        Arc::new(InMemoryDeadLetterSink::new()),
    ));

    let pipeline = Arc::new(RequestPipeline::new(
        rate_limiter,
        deterministic.clone(),
        semantic.clone(),
        stream_cache,
        coalescer,
        embedder,
        provider.clone(),
        ingest,
        3600,
        false,
    ));

    let tenants = InMemoryTenantRegistry::new();
    tenants.insert(TEST_KEY, Tenant::new("acme", Plan::Pro));

    let state = AppState::new(
        pipeline,
        Arc::new(tenants),
        semantic,
        deterministic,
        1_000_000,
        provider.name().to_string(),
    );

    super::create_router(state)
}

fn authed_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TEST_KEY}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_ok_without_auth() {
    let response = test_router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn chat_completions_without_auth_is_rejected() {
    let req = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({"model": "gpt-4o-mini", "messages": []}).to_string(),
        ))
        .unwrap();

    let response = test_router().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn chat_completions_round_trips_through_the_mock_provider() {
    let payload = serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "hello there"}],
    });
    let req = authed_request("POST", "/v1/chat/completions", payload);

    let response = test_router().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cache_header = response
        .headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert_eq!(cache_header, "MISS");

    let body = body_json(response).await;
    assert!(body["choices"][0]["message"]["content"].as_str().unwrap().contains("hello there"));
}

#[tokio::test]
async fn identical_chat_request_is_served_from_the_deterministic_cache() {
    let router = test_router();
    let payload = serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "repeat me"}],
    });

    let first = router
        .clone()
        .oneshot(authed_request("POST", "/v1/chat/completions", payload.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router
        .oneshot(authed_request("POST", "/v1/chat/completions", payload))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
}

#[tokio::test]
async fn completions_rejects_a_streaming_request() {
    let payload = serde_json::json!({
        "model": "gpt-4o-mini",
        "prompt": "hello",
        "stream": true,
    });
    let req = authed_request("POST", "/v1/completions", payload);

    let response = test_router().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_body_is_rejected_with_the_json_error_envelope() {
    let huge = "x".repeat(2_000_000);
    let payload = serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": huge}],
    });
    let req = authed_request("POST", "/v1/chat/completions", payload);

    let response = test_router().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn models_endpoint_lists_known_models() {
    let req = Request::builder()
        .method("GET")
        .uri("/v1/models")
        .header(header::AUTHORIZATION, format!("Bearer {TEST_KEY}"))
        .body(Body::empty())
        .unwrap();

    let response = test_router().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"].as_array().unwrap().iter().any(|m| m["id"] == "gpt-4o"));
}

#[tokio::test]
async fn cache_invalidate_requires_at_least_one_filter() {
    let req = authed_request("POST", "/v1/cache/invalidate", serde_json::json!({}));
    let response = test_router().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// S7: invalidating by model clears the deterministic cache, not only the semantic
/// one, so a third identical request after invalidation misses and re-invokes upstream.
#[tokio::test]
async fn invalidation_clears_the_deterministic_cache_entry() {
    let router = test_router();
    let payload = serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "remember me"}],
    });

    let first = router
        .clone()
        .oneshot(authed_request("POST", "/v1/chat/completions", payload.clone()))
        .await
        .unwrap();
    assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");

    let second = router
        .clone()
        .oneshot(authed_request("POST", "/v1/chat/completions", payload.clone()))
        .await
        .unwrap();
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");

    let invalidate = router
        .clone()
        .oneshot(authed_request(
            "POST",
            "/v1/cache/invalidate",
            serde_json::json!({"model": "gpt-4o-mini"}),
        ))
        .await
        .unwrap();
    assert_eq!(invalidate.status(), StatusCode::OK);
    let invalidate_body = body_json(invalidate).await;
    assert!(invalidate_body["entries_invalidated"].as_u64().unwrap() >= 1);

    let third = router
        .oneshot(authed_request("POST", "/v1/chat/completions", payload))
        .await
        .unwrap();
    assert_eq!(third.headers().get("x-cache").unwrap(), "MISS");
}

/// S2: an 11th request within a minute on the 10/min free plan is denied with the
/// full rate-limit/quota header set and a bounded `Retry-After`, not just a bare 429.
#[tokio::test]
async fn rate_limit_denial_carries_the_full_admission_header_set() {
    let store = Arc::new(InMemorySharedStore::new());
    let rate_limiter = RateLimiter::new(store.clone());
    let coalescer = Coalescer::new(store);
    let deterministic = Arc::new(DeterministicCache::with_capacity(100));
    let semantic = Arc::new(SemanticCache::with_capacity(50));
    let stream_cache = Arc::new(StreamCache::with_capacity(100));
    let provider: Arc<dyn ProviderClient> = Arc::new(MockProviderClient::default());
    let embedder = Arc::new(Embedder::new(provider.clone(), "text-embedding-3-small"));
    let ingest = Arc::new(IngestPipeline::new(
        Arc::new(InMemoryAnalyticsSink::new()),
        Arc::new(InMemoryDeadLetterSink::new()),
    ));
    let pipeline = Arc::new(RequestPipeline::new(
        rate_limiter,
        deterministic.clone(),
        semantic.clone(),
        stream_cache,
        coalescer,
        embedder,
        provider.clone(),
        ingest,
        3600,
        false,
    ));
    let tenants = InMemoryTenantRegistry::new();
    tenants.insert(TEST_KEY, Tenant::new("acme-free", Plan::Free));
    let state = AppState::new(
        pipeline,
        Arc::new(tenants),
        semantic,
        deterministic,
        1_000_000,
        provider.name().to_string(),
    );
    let router = super::create_router(state);

    let payload = |n: usize| {
        serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": format!("distinct message {n}")}],
        })
    };

    let mut last = None;
    for i in 0..11 {
        last = Some(
            router
                .clone()
                .oneshot(authed_request("POST", "/v1/chat/completions", payload(i)))
                .await
                .unwrap(),
        );
    }
    let response = last.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let headers = response.headers();
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
    let retry_after: u64 = headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!(retry_after <= 60);
    assert!(headers.get("x-quota-limit").is_some());
    assert!(headers.get("x-quota-remaining").is_some());

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "rate_limit_error");
}
