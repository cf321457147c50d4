//! Request pipeline: the state machine orchestrating every other component.
//!
//! Entered once a caller has already been authenticated and passed request-size
//! validation (both handled by the gateway layer). From here the sequence is
//! strictly rate-check, quota-observe, cache lookup (deterministic, then semantic,
//! then streaming where applicable), coalescer acquisition, upstream call, and
//! finally cache/coalescer writes plus an async usage event.

mod error;

pub use error::{PipelineError, PipelineResult};

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::cache::{
    CacheStatus, CachedResponseEntry, DeterministicCache, SemanticCache, SemanticCacheEntry,
    StreamCache, TokenCounts,
};
use crate::coalescer::Coalescer;
use crate::embedding::Embedder;
use crate::fingerprint::{bucket_key, context_hash, embedding_input, fingerprint};
use crate::observability::{IngestPipeline, UsageEvent};
use crate::pricing::estimate_cost_usd;
use crate::provider::{ByteStream, ProviderClient, ProviderResponse};
use crate::ratelimit::{Admission, RateLimiter};
use crate::request::{AnyRequest, ChatCompletionRequest, CompletionRequest, EmbeddingsRequest};
use crate::streaming::{replay_stream, tee_live_stream};
use crate::tenant::Tenant;

/// Per-request context the gateway hands to the pipeline: everything it needs that
/// isn't part of the wire request body itself.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub tenant: Tenant,
    pub endpoint: &'static str,
}

/// Response metadata the gateway renders into headers (§6 "Response headers (core)").
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub cache_status: CacheStatus,
    pub request_id: String,
    pub provider: String,
    pub latency_ms: u64,
    pub admission: Admission,
    pub cache_age_secs: Option<i64>,
    pub tokens_saved: Option<u64>,
    pub similarity: Option<f32>,
    pub cost_usd: Option<f64>,
}

/// The two response shapes a pipeline call can produce.
pub enum PipelineBody {
    Json(serde_json::Value),
    Stream(ByteStream),
}

pub struct PipelineResponse {
    pub meta: ResponseMeta,
    pub body: PipelineBody,
}

/// Wires every core component together behind the single entry point the gateway
/// calls per request.
#[derive(Clone)]
pub struct RequestPipeline {
    rate_limiter: RateLimiter,
    deterministic: Arc<DeterministicCache>,
    semantic: Arc<SemanticCache>,
    stream_cache: Arc<StreamCache>,
    coalescer: Coalescer,
    embedder: Arc<Embedder>,
    provider: Arc<dyn ProviderClient>,
    ingest: Arc<IngestPipeline>,
    default_ttl_secs: u64,
    fast_replay: bool,
}

impl RequestPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rate_limiter: RateLimiter,
        deterministic: Arc<DeterministicCache>,
        semantic: Arc<SemanticCache>,
        stream_cache: Arc<StreamCache>,
        coalescer: Coalescer,
        embedder: Arc<Embedder>,
        provider: Arc<dyn ProviderClient>,
        ingest: Arc<IngestPipeline>,
        default_ttl_secs: u64,
        fast_replay: bool,
    ) -> Self {
        Self {
            rate_limiter,
            deterministic,
            semantic,
            stream_cache,
            coalescer,
            embedder,
            provider,
            ingest,
            default_ttl_secs,
            fast_replay,
        }
    }

    /// `POST /v1/chat/completions`.
    #[instrument(skip(self, ctx, req), fields(request_id = %ctx.request_id, tenant = %ctx.tenant.id))]
    pub async fn handle_chat(
        &self,
        ctx: RequestContext,
        req: ChatCompletionRequest,
    ) -> PipelineResult<PipelineResponse> {
        let start = std::time::Instant::now();
        let any = AnyRequest::Chat(req.clone());
        any.validate()?;

        let admission = self.admit_and_observe(&ctx.tenant).await?;

        if any.is_streaming() {
            return self.handle_chat_stream(ctx, req, any, admission, start).await;
        }

        self.handle_non_streaming(ctx, any, admission, start, move |provider| {
            let req = req.clone();
            async move { provider.chat_completion(&req).await }
        })
        .await
    }

    /// `POST /v1/completions`. Streaming is rejected with 400 at validation time.
    #[instrument(skip(self, ctx, req), fields(request_id = %ctx.request_id, tenant = %ctx.tenant.id))]
    pub async fn handle_completion(
        &self,
        ctx: RequestContext,
        req: CompletionRequest,
    ) -> PipelineResult<PipelineResponse> {
        let start = std::time::Instant::now();
        let any = AnyRequest::Completion(req.clone());
        any.validate()?;

        let admission = self.admit_and_observe(&ctx.tenant).await?;

        self.handle_non_streaming(ctx, any, admission, start, move |provider| {
            let req = req.clone();
            async move { provider.completion(&req).await }
        })
        .await
    }

    /// `POST /v1/embeddings`. Bypasses every cache layer: embeddings are consumed
    /// internally to populate the semantic cache, but the client-facing endpoint is
    /// a pass-through to the upstream provider.
    #[instrument(skip(self, ctx, req), fields(request_id = %ctx.request_id, tenant = %ctx.tenant.id))]
    pub async fn handle_embeddings(
        &self,
        ctx: RequestContext,
        req: EmbeddingsRequest,
    ) -> PipelineResult<PipelineResponse> {
        let start = std::time::Instant::now();
        let admission = self.admit_and_observe(&ctx.tenant).await?;

        let response = self.provider.embeddings(&req).await?;
        let payload = serde_json::json!({
            "object": "list",
            "model": req.model,
            "data": response
                .embeddings
                .iter()
                .enumerate()
                .map(|(i, v)| serde_json::json!({"object": "embedding", "index": i, "embedding": v}))
                .collect::<Vec<_>>(),
            "usage": {
                "prompt_tokens": response.tokens.input,
                "total_tokens": response.tokens.total,
            },
        });

        let cost_usd = estimate_cost_usd(&req.model, response.tokens);
        self.emit_usage(&ctx, &req.model, ctx.endpoint, CacheStatus::Miss, response.tokens, cost_usd, 0.0);

        Ok(PipelineResponse {
            meta: ResponseMeta {
                cache_status: CacheStatus::Miss,
                request_id: ctx.request_id,
                provider: self.provider.name().to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
                admission,
                cache_age_secs: None,
                tokens_saved: None,
                similarity: None,
                cost_usd: Some(cost_usd),
            },
            body: PipelineBody::Json(payload),
        })
    }

    async fn admit_and_observe(&self, tenant: &Tenant) -> PipelineResult<Admission> {
        let admission = self.rate_limiter.admit(&tenant.id, tenant.plan).await;
        if !admission.allowed {
            return Err(if admission.denied_by_rate_limit() {
                PipelineError::RateLimited(admission)
            } else {
                PipelineError::QuotaExceeded(admission)
            });
        }
        self.rate_limiter.observe(&tenant.id).await;
        Ok(admission)
    }

    async fn handle_chat_stream(
        &self,
        ctx: RequestContext,
        req: ChatCompletionRequest,
        any: AnyRequest,
        admission: Admission,
        start: std::time::Instant,
    ) -> PipelineResult<PipelineResponse> {
        let fp = fingerprint(&any, &ctx.tenant.id);

        if let Some(entry) = self.stream_cache.get(&fp) {
            debug!(fingerprint = %fp, "stream cache hit, replaying transcript");
            let now = Utc::now();
            let age = (now - entry.generated_at).num_seconds().max(0);
            let tokens_saved = entry.tokens.total;
            let model = entry.model.clone();
            let tokens = entry.tokens;
            let body = replay_stream(entry, self.fast_replay);
            let cost_usd = estimate_cost_usd(&model, tokens);
            self.emit_usage(&ctx, &model, ctx.endpoint, CacheStatus::HitStream, tokens, 0.0, cost_usd);
            return Ok(PipelineResponse {
                meta: ResponseMeta {
                    cache_status: CacheStatus::HitStream,
                    request_id: ctx.request_id,
                    provider: self.provider.name().to_string(),
                    latency_ms: start.elapsed().as_millis() as u64,
                    admission,
                    cache_age_secs: Some(age),
                    tokens_saved: Some(tokens_saved),
                    similarity: None,
                    cost_usd: None,
                },
                body: PipelineBody::Stream(body),
            });
        }

        let effective_ttl = ctx.tenant.effective_ttl(ctx.endpoint, self.default_ttl_secs);
        let expires_at = effective_ttl.map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64));

        let upstream = self.provider.stream_chat_completion(&req).await?;
        let teed = tee_live_stream(upstream, self.stream_cache.clone(), fp, req.model.clone(), expires_at);

        Ok(PipelineResponse {
            meta: ResponseMeta {
                cache_status: CacheStatus::Miss,
                request_id: ctx.request_id,
                provider: self.provider.name().to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
                admission,
                cache_age_secs: None,
                tokens_saved: None,
                similarity: None,
                cost_usd: None,
            },
            body: PipelineBody::Stream(teed),
        })
    }

    async fn handle_non_streaming<F, Fut>(
        &self,
        ctx: RequestContext,
        any: AnyRequest,
        admission: Admission,
        start: std::time::Instant,
        call_upstream: F,
    ) -> PipelineResult<PipelineResponse>
    where
        F: FnOnce(Arc<dyn ProviderClient>) -> Fut,
        Fut: Future<Output = crate::provider::ProviderResult<ProviderResponse>>,
    {
        let fp = fingerprint(&any, &ctx.tenant.id);
        let kind = any.kind();

        if let Some(entry) = self.deterministic.get(&fp) {
            debug!(fingerprint = %fp, "deterministic cache hit");
            return Ok(self.hit_response(ctx, admission, start, entry, CacheStatus::Hit, None));
        }

        let embedding_attempt = self.try_embed(&any).await;

        if let Some((embedding, bkt)) = &embedding_attempt {
            if let Some((entry, similarity)) =
                self.semantic.find(&ctx.tenant.id, kind, bkt, embedding, ctx.tenant.semantic_cache_threshold)
            {
                debug!(fingerprint = %fp, similarity, "semantic cache hit");
                return Ok(self.hit_response(
                    ctx,
                    admission,
                    start,
                    entry.entry,
                    CacheStatus::HitSemantic,
                    Some(similarity),
                ));
            }
        }

        let acquisition = self.coalescer.acquire(&ctx.tenant.id, &fp, &ctx.request_id).await;

        if !acquisition.leader {
            if let Some(bytes) = self.coalescer.await_response(&ctx.tenant.id, &fp).await
                && let Ok(entry) = serde_json::from_slice::<CachedResponseEntry>(&bytes)
            {
                debug!(fingerprint = %fp, "coalesced hit from leader");
                return Ok(self.hit_response(ctx, admission, start, entry, CacheStatus::HitCoalesced, None));
            }
            // Leader failed or the wait ceiling elapsed: promote this request to leader.
            self.coalescer.acquire(&ctx.tenant.id, &fp, &ctx.request_id).await;
        }

        let upstream_result = call_upstream(self.provider.clone()).await;
        let response = match upstream_result {
            Ok(response) => response,
            Err(e) => {
                self.coalescer.release(&ctx.tenant.id, &fp).await;
                return Err(PipelineError::Upstream(e));
            }
        };

        let model = any.model().to_string();
        let effective_ttl = ctx.tenant.effective_ttl(ctx.endpoint, self.default_ttl_secs);
        let expires_at = effective_ttl.map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64));
        let entry = CachedResponseEntry {
            payload: response.payload.clone(),
            model: model.clone(),
            tenant_id: ctx.tenant.id.clone(),
            kind,
            generated_at: Utc::now(),
            tokens: response.tokens,
            expires_at,
        };

        if let Ok(encoded) = serde_json::to_vec(&entry) {
            self.coalescer.publish(&ctx.tenant.id, &fp, encoded).await;
        } else {
            self.coalescer.release(&ctx.tenant.id, &fp).await;
        }

        self.deterministic.put(&fp, entry.clone());

        if let Some((embedding, bkt)) = embedding_attempt {
            self.semantic.put(
                &ctx.tenant.id,
                kind,
                SemanticCacheEntry {
                    entry: entry.clone(),
                    embedding,
                    bucket_key: bkt,
                    source_text: embedding_input(&any),
                },
            );
        }

        let cost_usd = estimate_cost_usd(&model, response.tokens);
        self.emit_usage(&ctx, &model, ctx.endpoint, CacheStatus::Miss, response.tokens, cost_usd, cost_usd);

        Ok(PipelineResponse {
            meta: ResponseMeta {
                cache_status: CacheStatus::Miss,
                request_id: ctx.request_id,
                provider: self.provider.name().to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
                admission,
                cache_age_secs: None,
                tokens_saved: None,
                similarity: None,
                cost_usd: Some(cost_usd),
            },
            body: PipelineBody::Json(entry.payload),
        })
    }

    /// Embedding failures are non-fatal: the request proceeds as a semantic-cache
    /// miss rather than failing (§4.4).
    async fn try_embed(&self, any: &AnyRequest) -> Option<(Vec<f32>, String)> {
        let text = embedding_input(any);
        match self.embedder.embed(&text).await {
            Ok(embedding) => {
                let ctx_hash = context_hash(any);
                Some((embedding, bucket_key(any.model(), &ctx_hash)))
            }
            Err(e) => {
                warn!(error = %e, "embedding failed, proceeding as semantic-cache miss");
                None
            }
        }
    }

    fn hit_response(
        &self,
        ctx: RequestContext,
        admission: Admission,
        start: std::time::Instant,
        entry: CachedResponseEntry,
        status: CacheStatus,
        similarity: Option<f32>,
    ) -> PipelineResponse {
        let now = Utc::now();
        let age = entry.age_seconds(now);
        let tokens_saved = entry.tokens.total;
        let potential_cost = estimate_cost_usd(&entry.model, entry.tokens);
        self.emit_usage(&ctx, &entry.model, ctx.endpoint, status, entry.tokens, 0.0, potential_cost);

        PipelineResponse {
            meta: ResponseMeta {
                cache_status: status,
                request_id: ctx.request_id,
                provider: self.provider.name().to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
                admission,
                cache_age_secs: Some(age),
                tokens_saved: Some(tokens_saved),
                similarity,
                cost_usd: None,
            },
            body: PipelineBody::Json(entry.payload),
        }
    }

    fn emit_usage(
        &self,
        ctx: &RequestContext,
        model: &str,
        endpoint: &str,
        status: CacheStatus,
        tokens: TokenCounts,
        billable_cost_usd: f64,
        potential_cost_usd: f64,
    ) {
        self.ingest.publish(UsageEvent {
            event_id: Uuid::new_v4().to_string(),
            event_type: "usage.recorded".to_string(),
            tenant: ctx.tenant.id.clone(),
            run_id: ctx.request_id.clone(),
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "model": model,
                "endpoint": endpoint,
                "cache_status": status.as_header_value(),
                "tokens": tokens,
                "billable_cost_usd": billable_cost_usd,
                "potential_cost_usd": potential_cost_usd,
            }),
        });
    }
}
