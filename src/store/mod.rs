//! Pluggable persistence backends.
//!
//! - [`GraphStore`]: tenant-scoped relational storage for agents, edges,
//!   nutrients, and route records (sqlite-backed; see [`sqlite`]).
//! - [`VectorStore`]: ANN vector storage for hyphal memories (Qdrant-backed;
//!   see [`vector`]).
//! - [`KeyValueStore`]: raw key-value operations used by the rate limiter
//!   (Redis-backed; see [`dragonfly`]).

pub mod dragonfly;
pub mod sqlite;
pub mod vector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Agent, Edge, HyphalMemory, Nutrient, RouteRecord};
use crate::error::CoreResult;

/// A single ANN search hit from a [`VectorStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub payload: Option<serde_json::Value>,
}

/// Trait for key-value storage backends (rate-limit cache).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn save(&self, key: &str, value: &str) -> CoreResult<()>;
    async fn load(&self, key: &str) -> CoreResult<Option<String>>;
    async fn delete(&self, key: &str) -> CoreResult<()>;
    async fn exists(&self, key: &str) -> CoreResult<bool>;
    async fn save_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> CoreResult<()>;

    /// Sliding-window rate-limit check: trims entries older than
    /// `window_secs`, counts what remains, and records `member` if under
    /// `limit`. `key_ttl_secs` bounds how long the backing key itself
    /// survives (independent of `window_secs`, so a key can outlive a
    /// short window without being pruned away just as an idle tenant starts
    /// sending traffic again). Returns `(allowed, current_count)`.
    #[allow(clippy::too_many_arguments)]
    async fn sliding_window_incr(
        &self,
        key: &str,
        member: &str,
        now_ms: i64,
        window_secs: u64,
        key_ttl_secs: u64,
        limit: u32,
    ) -> CoreResult<(bool, u32)>;

    /// Fixed-window counter increment: adds `amount` to the counter at
    /// `key`, returning its new total. `ttl_secs` is applied only when this
    /// call creates the key, so a live window's expiry is never pushed back
    /// out by later increments. Backs quota tracking, where `sliding_window_incr`'s
    /// per-member set semantics don't fit a weighted cost.
    async fn incr_window(&self, key: &str, amount: u64, ttl_secs: u64) -> CoreResult<u64>;

    /// A real round-trip health check (e.g. `PING`).
    async fn health_check(&self) -> CoreResult<()>;
}

/// Trait for ANN vector storage backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        payload: Option<serde_json::Value>,
    ) -> CoreResult<()>;

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<serde_json::Value>,
    ) -> CoreResult<Vec<SearchResult>>;

    async fn delete(&self, id: &str) -> CoreResult<()>;

    /// A real round-trip health check (e.g. `list_collections`).
    async fn health_check(&self) -> CoreResult<()>;
}

/// Tenant-scoped relational storage (spec.md §4.A).
///
/// Every method takes a `tenant_id` and must never return or mutate rows
/// belonging to another tenant.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_agent(&self, agent: &Agent) -> CoreResult<()>;
    async fn get_agent(&self, tenant_id: &str, agent_id: &str) -> CoreResult<Option<Agent>>;

    /// Bulk-fetch agents by id in a single round trip. Missing ids are
    /// silently omitted from the result rather than erroring.
    async fn get_agents(&self, tenant_id: &str, agent_ids: &[String]) -> CoreResult<Vec<Agent>>;

    async fn list_agents(&self, tenant_id: &str) -> CoreResult<Vec<Agent>>;
    async fn deactivate_agent(&self, tenant_id: &str, agent_id: &str) -> CoreResult<()>;

    async fn get_edge(&self, tenant_id: &str, src: &str, dst: &str) -> CoreResult<Option<Edge>>;
    async fn upsert_edge(&self, edge: &Edge) -> CoreResult<()>;

    /// Apply `f` to the current edge (`None` if it does not exist yet) and
    /// persist whatever it returns, all inside one `BEGIN IMMEDIATE`
    /// transaction so two concurrent callers against the same edge
    /// serialize instead of racing a lost update. Returns the edge as it
    /// was before `f` ran (if any) alongside the edge that was persisted.
    async fn update_edge_with(
        &self,
        tenant_id: &str,
        src: &str,
        dst: &str,
        f: Box<dyn FnOnce(Option<Edge>) -> Edge + Send>,
    ) -> CoreResult<(Option<Edge>, Edge)>;

    async fn neighbors_of(&self, tenant_id: &str, src: &str) -> CoreResult<Vec<Edge>>;
    async fn count_tenant_edges(&self, tenant_id: &str) -> CoreResult<u64>;
    async fn top_edges(&self, tenant_id: &str, limit: usize) -> CoreResult<Vec<Edge>>;
    async fn delete_edge(&self, tenant_id: &str, src: &str, dst: &str) -> CoreResult<()>;
    async fn scan_all_edges(&self, tenant_id: &str) -> CoreResult<Vec<Edge>>;

    async fn insert_nutrient(&self, nutrient: &Nutrient) -> CoreResult<()>;
    async fn get_nutrient(&self, tenant_id: &str, id: &str) -> CoreResult<Option<Nutrient>>;
    async fn update_nutrient_hop(&self, tenant_id: &str, id: &str, hop: u32) -> CoreResult<()>;
    async fn delete_expired_nutrients(&self, tenant_id: &str) -> CoreResult<u64>;

    async fn insert_route_record(&self, record: &RouteRecord) -> CoreResult<()>;
    async fn routes_for_trace(&self, tenant_id: &str, trace_id: &str) -> CoreResult<Vec<RouteRecord>>;
    async fn update_route_outcome(
        &self,
        tenant_id: &str,
        trace_id: &str,
        dst_agent: &str,
        outcome_score: f64,
    ) -> CoreResult<()>;

    async fn health_check(&self) -> CoreResult<()>;

    /// Resolve a hashed API key to its tenant, scopes, and per-minute rate
    /// limit. Read-only — issuance and rotation belong to the out-of-scope
    /// identity service.
    async fn lookup_api_key(&self, key_hash: &str) -> CoreResult<Option<ApiKeyRecord>>;

    /// Every tenant with at least one agent or edge on record. Drives the
    /// background time-decay sweep (spec.md §4.E), which has no other way
    /// to discover which tenants exist.
    async fn list_tenants(&self) -> CoreResult<Vec<String>>;
}

/// An `api_keys` row (SPEC_FULL.md §11.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub tenant_id: String,
    pub scopes: Vec<String>,
    pub rate_limit_per_min: u32,
    /// Weighted nutrient-broadcast quota, minute window (spec.md §4.A).
    pub quota_per_min: u32,
    /// Weighted nutrient-broadcast quota, hour window.
    pub quota_per_hour: u32,
}

/// Tenant-scoped ANN memory storage, layered on [`VectorStore`] plus the
/// relational metadata a payload filter alone cannot express (spec.md
/// §4.D).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store(&self, memory: &HyphalMemory) -> CoreResult<()>;
    async fn get(&self, tenant_id: &str, id: &str) -> CoreResult<Option<HyphalMemory>>;
    async fn delete(&self, tenant_id: &str, id: &str) -> CoreResult<()>;
    async fn list_by_agent(&self, tenant_id: &str, agent_id: &str) -> CoreResult<Vec<HyphalMemory>>;
    async fn cleanup_expired(&self, tenant_id: &str) -> CoreResult<u64>;

    async fn search(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        limit: usize,
        kind: Option<&str>,
        agent_id: Option<&str>,
        min_quality: Option<f64>,
    ) -> CoreResult<Vec<(HyphalMemory, f64)>>;
}
