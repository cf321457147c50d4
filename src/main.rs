//! Cacheway HTTP gateway entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use cacheway::cache::{DeterministicCache, SemanticCache, StreamCache};
use cacheway::coalescer::Coalescer;
use cacheway::config::Config;
use cacheway::constants::DEFAULT_SEMANTIC_CACHE_CAPACITY;
use cacheway::embedding::Embedder;
use cacheway::gateway::{AppState, create_router};
use cacheway::observability::{IngestPipeline, InMemoryAnalyticsSink, InMemoryDeadLetterSink};
use cacheway::pipeline::RequestPipeline;
use cacheway::provider::{HttpProviderClient, MockProviderClient, ProviderClient};
use cacheway::ratelimit::RateLimiter;
use cacheway::shared_store::InMemorySharedStore;
use cacheway::tenant::{InMemoryTenantRegistry, Plan, Tenant, TenantRegistry};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
  ____           _
 / ___|__ _  ___| |__   _____      ____ _ _   _
| |   / _` |/ __| '_ \ / _ \ \ /\ / / _` | | | |
| |__| (_| | (__| | | |  __/\ V  V / (_| | |_| |
 \____\__,_|\___|_| |_|\___| \_/\_/ \__,_|\__, |
                                           |___/
        cache first, pay less
"#
    );

    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        mock_provider = config.mock_provider,
        "cacheway starting"
    );

    let store = Arc::new(InMemorySharedStore::new());
    let rate_limiter = RateLimiter::new(store.clone());
    let coalescer = Coalescer::new(store);

    let deterministic = Arc::new(DeterministicCache::with_capacity(
        config.deterministic_cache_capacity,
    ));
    let semantic = Arc::new(SemanticCache::with_capacity(DEFAULT_SEMANTIC_CACHE_CAPACITY));
    let stream_cache = Arc::new(StreamCache::with_capacity(config.deterministic_cache_capacity));

    let provider: Arc<dyn ProviderClient> = if config.mock_provider {
        tracing::warn!("CACHEWAY_MOCK_PROVIDER is set, running against an in-process mock provider");
        Arc::new(MockProviderClient::default())
    } else {
        Arc::new(HttpProviderClient::new(
            config.provider_base_url.clone(),
            config.provider_api_key.clone().unwrap_or_default(),
            "openai",
        ))
    };

    let embedder = Arc::new(Embedder::new(provider.clone(), config.embedding_model.clone()));

    let ingest = Arc::new(IngestPipeline::new(
        Arc::new(InMemoryAnalyticsSink::new()),
        Arc::new(InMemoryDeadLetterSink::new()),
    ));
    ingest.start_flush_loop();

    let pipeline = Arc::new(RequestPipeline::new(
        rate_limiter,
        deterministic.clone(),
        semantic.clone(),
        stream_cache,
        coalescer,
        embedder,
        provider.clone(),
        ingest.clone(),
        config.default_cache_ttl_seconds,
        config.fast_replay,
    ));

    let tenants: Arc<dyn TenantRegistry> = Arc::new(seed_tenants());

    let state = AppState::new(
        pipeline,
        tenants,
        semantic,
        deterministic,
        config.max_request_size_bytes,
        provider.name().to_string(),
    );

    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ingest))
        .await?;

    tracing::info!("cacheway shutdown complete");
    Ok(())
}

/// Seeds the in-memory tenant registry. The real credential store is an external
/// collaborator (see [`cacheway::tenant::TenantRegistry`]); until one is wired in,
/// a single development tenant is registered under `CACHEWAY_DEV_API_KEY`.
fn seed_tenants() -> InMemoryTenantRegistry {
    let registry = InMemoryTenantRegistry::new();

    let key = std::env::var("CACHEWAY_DEV_API_KEY")
        .unwrap_or_else(|_| "lgw_test_00000000000000000000000000000000".to_string());
    registry.insert(key, Tenant::new("dev", Plan::Pro));

    registry
}

fn run_health_check() -> i32 {
    let port = std::env::var("CACHEWAY_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{}/health", port);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");

    rt.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .expect("failed to build client");

        match client.get(&url).send().await {
            Ok(res) if res.status().is_success() => 0,
            _ => 1,
        }
    })
}

async fn shutdown_signal(ingest: Arc<IngestPipeline>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
    }

    tracing::info!("draining usage ingest buffer");
    ingest.drain().await;
}
