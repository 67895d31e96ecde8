//! Memorai HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use memorai::config::Config;
use memorai::embedding::{LocalConfig, RemoteConfig};
use memorai::engine::{EngineConfig, MemoryEngine};
use memorai::gateway::{AppState, create_router_with_state};
use memorai::index::{InMemoryIndex, QdrantIndex, VectorIndex};
use memorai::ratelimit::{RateLimiter, RateLimiterConfig};
use memorai::tier::{TierChainSpec, TierController};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
███╗   ███╗███████╗███╗   ███╗ ██████╗ ██████╗  █████╗ ██╗
████╗ ████║██╔════╝████╗ ████║██╔═══██╗██╔══██╗██╔══██╗██║
██╔████╔██║█████╗  ██╔████╔██║██║   ██║██████╔╝███████║██║
██║╚██╔╝██║██╔══╝  ██║╚██╔╝██║██║   ██║██╔══██╗██╔══██║██║
██║ ╚═╝ ██║███████╗██║ ╚═╝ ██║╚██████╔╝██║  ██║██║  ██║██║
╚═╝     ╚═╝╚══════╝╚═╝     ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝

        REMEMBER. RECALL. FORGET.
                                        AGPL-3.0
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

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        collection = %config.collection,
        dimension = config.embedding_dim,
        "Memorai starting"
    );

    match config.index_url.clone() {
        Some(url) => {
            let index = QdrantIndex::new(
                &url,
                config.index_api_key.as_deref(),
                config.collection.clone(),
            )
            .await?;
            tracing::info!(url = %url, "Using Qdrant vector index");
            serve(index, config).await
        }
        None => {
            tracing::warn!("No index URL configured, using the in-memory index (non-durable)");
            serve(InMemoryIndex::new(), config).await
        }
    }
}

async fn serve<I: VectorIndex + 'static>(index: I, config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.socket_addr().parse()?;

    let remote = match (&config.embedding_endpoint, &config.embedding_api_key) {
        (Some(endpoint), Some(api_key)) => {
            let mut remote =
                RemoteConfig::new(endpoint.clone(), api_key.clone()).dimension(config.embedding_dim);
            if let Some(deployment) = &config.embedding_deployment {
                remote = remote.deployment(deployment.clone());
            }
            Some(remote)
        }
        _ => None,
    };

    let spec = TierChainSpec {
        remote,
        local: config
            .local_embedding_url
            .as_ref()
            .map(|url| LocalConfig::new(url.clone(), config.embedding_dim)),
        dimension: config.embedding_dim,
        preferred: config.preferred_tier,
        test_mode: config.test_mode,
    };
    let tiers = TierController::from_spec(&spec)?;

    let limiter = RateLimiter::new(RateLimiterConfig::default());

    let engine = Arc::new(
        MemoryEngine::init(
            index,
            tiers,
            limiter,
            EngineConfig::default(),
            config.cache_capacity,
        )
        .await?,
    );

    let descriptor = engine.tier_info().await?;
    tracing::info!(tier = %descriptor.level, message = %descriptor.message, "Embedding tier active");

    engine.start_limit_sweeper(Duration::from_secs(60));

    let app = create_router_with_state(AppState::new(Arc::clone(&engine)));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.flush_write_behind().await;
    tracing::info!("Memorai shutdown complete");
    Ok(())
}

fn run_health_check() -> i32 {
    let port = std::env::var("MEMORAI_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8484);

    let url = format!("http://127.0.0.1:{}/healthz", port);

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

async fn shutdown_signal() {
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
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
