//! `myceliumd` — the mycelial substrate data-plane daemon. Wires the
//! pluggable storage backends, background reinforcement task, and HTTP
//! server together and serves until signaled to shut down.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use mycelium_core::config::{AppConfig, CliArgs};
use mycelium_core::quota::QuotaTracker;
use mycelium_core::ratelimit::RateLimiter;
use mycelium_core::reinforcement;
use mycelium_core::security::{aes::SecureVault, audit::AuditLogger, identity::SigningIdentity};
use mycelium_core::server::{self, AppState};
use mycelium_core::store::dragonfly::RedisStore;
use mycelium_core::store::sqlite::SqliteGraphStore;
use mycelium_core::store::vector::{QdrantMemoryStore, QdrantVectorStore};
use mycelium_core::store::GraphStore;
use mycelium_core::{domain::EMBEDDING_DIM, metrics};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = CliArgs::parse();
    let mut config = AppConfig::from_env()?;
    config.apply_overrides(&cli);

    info!(host = %config.bind_host, port = config.bind_port, "starting myceliumd");

    let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(
        &config.graph_store_path,
        config.graph_store_pool_min,
        config.graph_store_pool_max,
    )?);

    let vector_store = Arc::new(QdrantVectorStore::new(&config.vector_db_url, "hyphal_memories", EMBEDDING_DIM));
    let memory = Arc::new(QdrantMemoryStore::new(vector_store.clone()));
    let rate_cache = Arc::new(RedisStore::new(&config.redis_url));
    let rate_limiter = Arc::new(RateLimiter::new(rate_cache.clone()));
    let quota = Arc::new(QuotaTracker::new(rate_cache.clone()));
    let cap_cache = Arc::new(mycelium_core::propagation::NeighborCapCache::new());
    let vault = Arc::new(SecureVault::from_secret(&config.encryption_secret));
    let audit = Arc::new(AuditLogger::new(SigningIdentity::from_seed(&config.signing_key_seed)));
    let metrics_handle = metrics::install();

    let (decay_shutdown, decay_handle) = reinforcement::spawn_decay_task(graph.clone());

    let state = AppState {
        graph,
        memory,
        vector: vector_store,
        rate_cache,
        rate_limiter,
        cap_cache,
        quota,
        vault,
        audit,
        metrics_handle,
    };

    let app = server::build_router(state);
    let addr = format!("{}:{}", config.bind_host, config.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = decay_shutdown.send(true);
    decay_handle.await?;
    info!("myceliumd shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
}
