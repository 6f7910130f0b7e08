//! HTTP/JSON wire protocol (spec.md §6): axum router, shared state, and
//! per-endpoint handlers.

pub mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::propagation::NeighborCapCache;
use crate::quota::QuotaTracker;
use crate::ratelimit::RateLimiter;
use crate::security::{audit::AuditLogger, aes::SecureVault};
use crate::store::{GraphStore, KeyValueStore, MemoryStore, VectorStore};

#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<dyn GraphStore>,
    pub memory: Arc<dyn MemoryStore>,
    pub vector: Arc<dyn VectorStore>,
    pub rate_cache: Arc<dyn KeyValueStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cap_cache: Arc<NeighborCapCache>,
    pub quota: Arc<QuotaTracker>,
    pub vault: Arc<SecureVault>,
    pub audit: Arc<AuditLogger>,
    pub metrics_handle: PrometheusHandle,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/nutrients:broadcast", post(handlers::broadcast_nutrient))
        .route("/v1/contexts:collect", post(handlers::collect_contexts))
        .route("/v1/outcomes:record", post(handlers::record_outcome))
        .route("/v1/hyphal:store", post(handlers::store_memory))
        .route("/v1/hyphal:search", post(handlers::search_memory))
        .route("/v1/hyphal/agent/:agent_id", get(handlers::list_memory_by_agent))
        .route("/v1/hyphal/:id", get(handlers::get_memory).delete(handlers::delete_memory))
        .route("/v1/hyphal:cleanup", post(handlers::cleanup_memory))
        .route("/v1/agents:register", post(handlers::register_agent))
        .route("/v1/agents", get(handlers::list_agents))
        .route("/v1/agents/:id", delete(handlers::deactivate_agent))
        .route("/v1/edges/stats", get(handlers::edge_stats))
        .route("/v1/edges/top", get(handlers::top_edges))
        .route("/v1/edges/:agent_id", get(handlers::edges_for_agent))
        .route("/v1/edges:prune", post(handlers::prune_edges))
        .route("/v1/edges:decay", post(handlers::decay_edges))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_text))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
