//! Per-endpoint request handlers. Each mutating endpoint authenticates via
//! `X-API-Key`, checks the rate limit, and delegates to the relevant
//! engine module — handlers themselves hold no business logic.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::{self, AuthContext, SCOPE_WRITE};
use crate::domain::{Agent, AgentStatus, Embedding, Outcome, Sensitivity, EMBEDDING_DIM, RECENT_TASKS_WINDOW};
use crate::error::CoreError;
use crate::hyphal;
use crate::metrics;
use crate::propagation::{self, BroadcastRequest, CollectRequest};
use crate::reinforcement;

use super::AppState;

fn api_key_from_headers(headers: &HeaderMap) -> &str {
    headers.get("X-API-Key").and_then(|v| v.to_str().ok()).unwrap_or("")
}

async fn authenticate_and_throttle(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, CoreError> {
    let ctx = auth::authenticate(state.graph.as_ref(), api_key_from_headers(headers)).await?;
    let outcome = state.rate_limiter.check(&ctx.tenant_id, ctx.rate_limit_per_min).await?;
    if !outcome.allowed {
        metrics::record_rate_limited(&ctx.tenant_id);
        return Err(CoreError::RateLimited {
            retry_after_secs: 60,
            limit: outcome.limit,
            remaining: outcome.remaining,
        });
    }
    Ok(ctx)
}

// ---- nutrients:broadcast ----

#[derive(Debug, Deserialize)]
pub struct BroadcastBody {
    pub summary: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub snippets: Vec<String>,
    #[serde(default)]
    pub tool_hints: Vec<String>,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: String,
    pub ttl_sec: u32,
    pub max_hops: u32,
    #[serde(default = "default_quota_cost")]
    pub quota_cost: u32,
    pub source_agent_id: Option<String>,
}

fn default_sensitivity() -> String {
    "internal".to_string()
}
fn default_quota_cost() -> u32 {
    1
}

pub async fn broadcast_nutrient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BroadcastBody>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    if !ctx.has_scope(SCOPE_WRITE) {
        return Err(CoreError::Forbidden("write scope required".into()));
    }

    let started = Instant::now();
    let req = BroadcastRequest {
        tenant_id: ctx.tenant_id.clone(),
        source_agent_id: body.source_agent_id.unwrap_or_else(|| "default".to_string()),
        summary: body.summary,
        embedding: body.embedding,
        snippets: body.snippets,
        tool_hints: body.tool_hints,
        sensitivity: Sensitivity::normalize(&body.sensitivity),
        ttl_sec: body.ttl_sec,
        max_hops: body.max_hops,
        quota_cost: body.quota_cost,
    };

    let quota_limits = crate::quota::QuotaLimits { per_min: ctx.quota_per_min, per_hour: ctx.quota_per_hour };
    let result = propagation::broadcast(state.graph.as_ref(), &state.cap_cache, state.quota.as_ref(), quota_limits, req)
        .await
        .map_err(|e| {
            if matches!(e, CoreError::QuotaExceeded(_)) {
                metrics::record_quota_exceeded(&ctx.tenant_id);
            }
            e
        })?;
    metrics::record_broadcast(&ctx.tenant_id, result.routed_to.len());
    metrics::record_routing_latency(started.elapsed().as_secs_f64());

    state.audit.record(
        &ctx.tenant_id,
        &result.trace_id,
        "nutrient.broadcast",
        serde_json::json!({ "nutrient_id": result.nutrient_id, "routed_to": result.routed_to }),
    );

    Ok((StatusCode::OK, Json(result)))
}

// ---- contexts:collect ----

#[derive(Debug, Deserialize)]
pub struct CollectBody {
    pub demand_embedding: Vec<f32>,
    #[serde(default = "default_window_ms")]
    pub window_ms: u32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub diversify: bool,
}

fn default_window_ms() -> u32 {
    1000
}
fn default_top_k() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct CollectResponse {
    pub results: Vec<crate::domain::MemoryHit>,
    /// `window_ms` is advisory only — the collect path never waits for
    /// late arrivals (spec.md §9 open question 1). Echoed back so callers
    /// can see what was requested.
    pub window_ms: u32,
}

pub async fn collect_contexts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CollectBody>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;

    let req = CollectRequest {
        tenant_id: ctx.tenant_id.clone(),
        demand_embedding: body.demand_embedding,
        top_k: body.top_k,
        diversify: body.diversify,
    };

    let results = propagation::collect(state.memory.as_ref(), req).await?;
    metrics::record_collect(&ctx.tenant_id, results.len());

    Ok((StatusCode::OK, Json(CollectResponse { results, window_ms: body.window_ms })))
}

// ---- outcomes:record ----

#[derive(Debug, Deserialize)]
pub struct OutcomeBody {
    pub trace_id: String,
    pub outcome_score: Option<f64>,
    pub hop_outcomes: Option<std::collections::HashMap<String, f64>>,
}

pub async fn record_outcome(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<OutcomeBody>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;

    if body.outcome_score.is_none() && body.hop_outcomes.is_none() {
        return Err(CoreError::Validation("must supply outcome_score or hop_outcomes".into()));
    }

    let outcome = Outcome {
        trace_id: body.trace_id.clone(),
        uniform_score: body.outcome_score,
        hop_outcomes: body.hop_outcomes,
    };

    let updates = reinforcement::credit_outcome(state.graph.as_ref(), &ctx.tenant_id, &outcome).await?;
    metrics::record_outcome(&ctx.tenant_id, updates.len());

    state.audit.record(
        &ctx.tenant_id,
        &body.trace_id,
        "outcome.credit",
        serde_json::to_value(&updates)?,
    );

    Ok((StatusCode::OK, Json(updates)))
}

// ---- hyphal:store / search / get / list / delete / cleanup ----

#[derive(Debug, Deserialize)]
pub struct StoreMemoryBody {
    pub agent_id: String,
    pub kind: String,
    pub content: serde_json::Value,
    pub embedding: Vec<f32>,
    pub quality: f64,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: String,
    pub ttl_hours: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct StoreMemoryResponse {
    pub id: String,
}

pub async fn store_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StoreMemoryBody>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;

    let sensitivity = Sensitivity::normalize(&body.sensitivity);
    let content = if sensitivity.requires_encryption() {
        let plaintext = serde_json::to_string(&body.content)?;
        serde_json::json!({ "encrypted": state.vault.encrypt(&plaintext)? })
    } else {
        body.content
    };

    let id = hyphal::store(
        state.memory.as_ref(),
        hyphal::StoreMemoryRequest {
            tenant_id: ctx.tenant_id,
            agent_id: body.agent_id,
            kind: body.kind,
            content,
            embedding: body.embedding,
            quality: body.quality,
            sensitivity_raw: body.sensitivity,
            ttl_hours: body.ttl_hours,
            metadata: body.metadata,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(StoreMemoryResponse { id })))
}

#[derive(Debug, Deserialize)]
pub struct SearchMemoryBody {
    pub embedding: Vec<f32>,
    #[serde(default = "default_search_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_quality: f64,
    pub kind_filter: Option<String>,
    pub agent_filter: Option<String>,
}

fn default_search_top_k() -> usize {
    10
}

pub async fn search_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SearchMemoryBody>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;

    let hits = hyphal::search(
        state.memory.as_ref(),
        hyphal::SearchMemoryRequest {
            tenant_id: ctx.tenant_id,
            embedding: body.embedding,
            top_k: body.top_k,
            min_quality: body.min_quality,
            kind_filter: body.kind_filter,
            agent_filter: body.agent_filter,
        },
    )
    .await?;

    Ok((StatusCode::OK, Json(hits)))
}

pub async fn get_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    let memory = hyphal::get(state.memory.as_ref(), &ctx.tenant_id, &id).await?;
    Ok((StatusCode::OK, Json(memory)))
}

pub async fn delete_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    hyphal::delete(state.memory.as_ref(), &ctx.tenant_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_memory_by_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    let memories = hyphal::list_by_agent(state.memory.as_ref(), &ctx.tenant_id, &agent_id).await?;
    Ok((StatusCode::OK, Json(memories)))
}

pub async fn cleanup_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    ctx.require_admin()?;
    let deleted = hyphal::cleanup_expired(state.memory.as_ref(), &ctx.tenant_id).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "deleted": deleted }))))
}

// ---- agents ----

#[derive(Debug, Deserialize)]
pub struct AgentProfileBody {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterAgentBody {
    pub agent_id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    pub profile: AgentProfileBody,
    pub region: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

pub async fn register_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterAgentBody>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;

    if body.profile.embedding.len() != EMBEDDING_DIM {
        return Err(CoreError::Validation(format!(
            "embedding must be {EMBEDDING_DIM}-dimensional, got {}",
            body.profile.embedding.len()
        )));
    }

    let now = chrono::Utc::now();
    let existing = state.graph.get_agent(&ctx.tenant_id, &body.agent_id).await?;

    let agent = Agent {
        id: body.agent_id,
        tenant_id: ctx.tenant_id,
        name: body.name,
        capabilities: body.capabilities,
        tools: body.tools,
        profile_embedding: Embedding(body.profile.embedding),
        recent_tasks: existing
            .map(|a| a.recent_tasks)
            .unwrap_or_default()
            .into_iter()
            .take(RECENT_TASKS_WINDOW)
            .collect(),
        status: AgentStatus::Active,
        region: body.region,
        metadata: body.metadata,
        created_at: now,
        updated_at: now,
    };

    state.graph.upsert_agent(&agent).await?;
    Ok((StatusCode::OK, Json(agent)))
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    pub status_filter: Option<String>,
    pub capability: Option<String>,
}

pub async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListAgentsQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    let mut agents = state.graph.list_agents(&ctx.tenant_id).await?;

    if let Some(status) = &query.status_filter {
        agents.retain(|a| {
            let s = match a.status {
                AgentStatus::Active => "active",
                AgentStatus::Idle => "idle",
                AgentStatus::Suspended => "suspended",
            };
            s == status
        });
    }
    if let Some(cap) = &query.capability {
        agents.retain(|a| a.capabilities.iter().any(|c| c == cap));
    }

    Ok((StatusCode::OK, Json(agents)))
}

pub async fn deactivate_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    state.graph.deactivate_agent(&ctx.tenant_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- edges ----

#[derive(Debug, Deserialize)]
pub struct EdgeListQuery {
    #[serde(default = "default_edge_limit")]
    pub limit: usize,
    #[serde(default)]
    pub min_weight: f64,
}

fn default_edge_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct EdgeStatsResponse {
    pub total_edges: u64,
    pub neighbor_cap: u64,
}

pub async fn edge_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    let total = state.graph.count_tenant_edges(&ctx.tenant_id).await?;
    let cap = state.cap_cache.get_or_refresh(state.graph.as_ref(), &ctx.tenant_id).await?;
    Ok((StatusCode::OK, Json(EdgeStatsResponse { total_edges: total, neighbor_cap: cap })))
}

pub async fn top_edges(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EdgeListQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    let edges = state.graph.top_edges(&ctx.tenant_id, query.limit).await?;
    let filtered: Vec<_> = edges.into_iter().filter(|e| e.w >= query.min_weight).collect();
    Ok((StatusCode::OK, Json(filtered)))
}

pub async fn edges_for_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
    Query(query): Query<EdgeListQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    let edges = state.graph.neighbors_of(&ctx.tenant_id, &agent_id).await?;
    let filtered: Vec<_> = edges
        .into_iter()
        .filter(|e| e.w >= query.min_weight)
        .take(query.limit)
        .collect();
    Ok((StatusCode::OK, Json(filtered)))
}

#[derive(Debug, Deserialize)]
pub struct PruneBody {
    pub threshold: f64,
}

pub async fn prune_edges(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PruneBody>,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    ctx.require_admin()?;

    let edges = state.graph.scan_all_edges(&ctx.tenant_id).await?;
    let mut pruned = 0u64;
    for edge in edges {
        if edge.w < body.threshold {
            state.graph.delete_edge(&ctx.tenant_id, &edge.src, &edge.dst).await?;
            pruned += 1;
        }
    }

    Ok((StatusCode::OK, Json(serde_json::json!({ "pruned": pruned }))))
}

pub async fn decay_edges(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, CoreError> {
    let ctx = authenticate_and_throttle(&state, &headers).await?;
    ctx.require_admin()?;

    let (decayed, deleted) = reinforcement::decay_tenant_edges(state.graph.as_ref(), &ctx.tenant_id).await?;
    metrics::record_decay_tick(decayed, deleted);
    Ok((StatusCode::OK, Json(serde_json::json!({ "decayed": decayed, "deleted": deleted }))))
}

// ---- system ----

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub graph_store: bool,
    pub vector_store: bool,
    pub rate_cache: bool,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let graph_store = state.graph.health_check().await.is_ok();
    let vector_store = state.vector.health_check().await.is_ok();
    let rate_cache = state.rate_cache.health_check().await.is_ok();

    let status = if graph_store && vector_store && rate_cache {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(HealthResponse { graph_store, vector_store, rate_cache }))
}

pub async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    metrics::render(&state.metrics_handle)
}
