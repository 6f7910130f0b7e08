//! The Propagation Controller (component C): validates and persists
//! nutrients, asks the Routing Engine for neighbors, and logs route
//! records for later credit assignment.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Nutrient, RouteRecord, Sensitivity};
use crate::error::{retry_transient, CoreError, CoreResult};
use crate::quota::{QuotaLimits, QuotaTracker};
use crate::routing::{self, Neighbor, DEFAULT_TOP_K};
use crate::store::GraphStore;

pub const NEIGHBOR_CAP_MIN: u64 = 20;
pub const NEIGHBOR_CAP_MAX: u64 = 50;
pub const NEIGHBOR_CAP_DIVISOR: u64 = 10;
pub const NEIGHBOR_CAP_CACHE_TTL: Duration = Duration::from_secs(300);

pub const MAX_HOPS_BOUND: (u32, u32) = (1, 10);
pub const TTL_SEC_BOUND: (u32, u32) = (1, 3600);
pub const COLLECT_TOP_K_BOUND: (u32, u32) = (1, 50);
pub const OVER_FETCH_FACTOR: usize = 2;

#[derive(Clone, Debug)]
pub struct BroadcastRequest {
    pub tenant_id: String,
    pub source_agent_id: String,
    pub summary: String,
    pub embedding: Vec<f32>,
    pub snippets: Vec<String>,
    pub tool_hints: Vec<String>,
    pub sensitivity: Sensitivity,
    pub ttl_sec: u32,
    pub max_hops: u32,
    pub quota_cost: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub nutrient_id: String,
    pub trace_id: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub routed_to: Vec<String>,
}

fn random_id(prefix: &str) -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill(&mut bytes);
    format!("{prefix}-{}", hex::encode(bytes))
}

fn validate_broadcast(req: &BroadcastRequest) -> CoreResult<()> {
    if req.embedding.len() != crate::domain::EMBEDDING_DIM {
        return Err(CoreError::Validation(format!(
            "embedding must be {}-dimensional, got {}",
            crate::domain::EMBEDDING_DIM,
            req.embedding.len()
        )));
    }
    if !(MAX_HOPS_BOUND.0..=MAX_HOPS_BOUND.1).contains(&req.max_hops) {
        return Err(CoreError::Validation(format!(
            "max_hops must be in [{}, {}]",
            MAX_HOPS_BOUND.0, MAX_HOPS_BOUND.1
        )));
    }
    if !(TTL_SEC_BOUND.0..=TTL_SEC_BOUND.1).contains(&req.ttl_sec) {
        return Err(CoreError::Validation(format!(
            "ttl_sec must be in [{}, {}]",
            TTL_SEC_BOUND.0, TTL_SEC_BOUND.1
        )));
    }
    Ok(())
}

/// Process-local, 5-minute-TTL cache of `clamp(total_tenant_edges/10, 20, 50)`
/// per tenant. A brief race returning a stale cap is harmless (spec.md §5).
#[derive(Default)]
pub struct NeighborCapCache {
    entries: RwLock<std::collections::HashMap<String, (u64, Instant)>>,
}

impl NeighborCapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_refresh(&self, store: &dyn GraphStore, tenant_id: &str) -> CoreResult<u64> {
        if let Some((cap, fetched_at)) = self.entries.read().get(tenant_id).copied() {
            if fetched_at.elapsed() < NEIGHBOR_CAP_CACHE_TTL {
                return Ok(cap);
            }
        }

        let total = retry_transient(|| store.count_tenant_edges(tenant_id)).await?;
        let cap = (total / NEIGHBOR_CAP_DIVISOR).clamp(NEIGHBOR_CAP_MIN, NEIGHBOR_CAP_MAX);
        self.entries.write().insert(tenant_id.to_string(), (cap, Instant::now()));
        Ok(cap)
    }
}

/// Broadcast a nutrient from `source_agent_id`: validates, persists the
/// nutrient and a mandatory self-route record, then routes to up to
/// [`DEFAULT_TOP_K`] diversified neighbors and logs one `RouteRecord` per
/// pick.
pub async fn broadcast(
    store: &dyn GraphStore,
    cap_cache: &NeighborCapCache,
    quota: &QuotaTracker,
    quota_limits: QuotaLimits,
    req: BroadcastRequest,
) -> CoreResult<BroadcastResult> {
    validate_broadcast(&req)?;

    // Quota is the hard precondition — checked before the nutrient is ever
    // persisted, so an exhausted tenant can't even pay for storage it will
    // never get to use.
    quota.charge(&req.tenant_id, req.quota_cost, quota_limits).await?;

    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::seconds(req.ttl_sec as i64);
    if expires_at <= now {
        return Err(CoreError::Conflict("nutrient would be born expired".into()));
    }

    let nutrient_id = random_id("nut");
    let trace_id = random_id("trace");

    let nutrient = Nutrient {
        id: nutrient_id.clone(),
        tenant_id: req.tenant_id.clone(),
        trace_id: trace_id.clone(),
        summary: req.summary,
        embedding: crate::domain::Embedding(req.embedding.clone()),
        snippets: req.snippets,
        tool_hints: req.tool_hints.clone(),
        sensitivity: req.sensitivity,
        current_hop: 0,
        max_hops: req.max_hops,
        ttl_sec: req.ttl_sec,
        quota_cost: req.quota_cost,
        created_at: now,
        expires_at,
    };
    retry_transient(|| store.insert_nutrient(&nutrient)).await?;

    // Mandatory self-route record at hop 0, score 1.0 — load-bearing even
    // for agents with no neighbors yet (spec.md §9 open question 3).
    let self_route = RouteRecord {
        tenant_id: req.tenant_id.clone(),
        nutrient_id: nutrient_id.clone(),
        trace_id: trace_id.clone(),
        src_agent: req.source_agent_id.clone(),
        dst_agent: req.source_agent_id.clone(),
        hop_number: 0,
        routing_score: 1.0,
        outcome_score: None,
        routed_at: now,
    };
    retry_transient(|| store.insert_route_record(&self_route)).await?;

    let cap = cap_cache.get_or_refresh(store, &req.tenant_id).await?;
    let edges = retry_transient(|| store.neighbors_of(&req.tenant_id, &req.source_agent_id)).await?;
    let capped_edges: Vec<_> = edges.into_iter().take(cap as usize).collect();

    // Single round trip for every neighbor profile instead of one fetch
    // per edge.
    let dst_ids: Vec<String> = capped_edges.iter().map(|e| e.dst.clone()).collect();
    let agents = retry_transient(|| store.get_agents(&req.tenant_id, &dst_ids)).await?;
    let agent_by_id: std::collections::HashMap<&str, &crate::domain::Agent> =
        agents.iter().map(|a| (a.id.as_str(), a)).collect();

    let mut neighbors = Vec::with_capacity(capped_edges.len());
    for edge in &capped_edges {
        if let Some(agent) = agent_by_id.get(edge.dst.as_str()) {
            neighbors.push(Neighbor {
                agent_id: agent.id.clone(),
                profile_embedding: agent.profile_embedding.clone().into_vec(),
                edge_weight: edge.w,
                recent_tasks: agent.recent_tasks.clone(),
                capabilities: agent.capabilities.clone(),
            });
        }
    }

    let selection = routing::route(&req.embedding, &req.tool_hints, &neighbors, DEFAULT_TOP_K, true)?;

    let mut routed_to = vec![req.source_agent_id.clone()];
    for pick in &selection.picks {
        let record = RouteRecord {
            tenant_id: req.tenant_id.clone(),
            nutrient_id: nutrient_id.clone(),
            trace_id: trace_id.clone(),
            src_agent: req.source_agent_id.clone(),
            dst_agent: pick.agent_id.clone(),
            hop_number: 0,
            routing_score: pick.score,
            outcome_score: None,
            routed_at: now,
        };
        retry_transient(|| store.insert_route_record(&record)).await?;
        routed_to.push(pick.agent_id.clone());
    }

    info!(
        tenant = %req.tenant_id, nutrient_id = %nutrient_id, trace_id = %trace_id,
        routed = routed_to.len(), explored = selection.explored,
        "broadcast complete"
    );

    Ok(BroadcastResult { nutrient_id, trace_id, expires_at, routed_to })
}

#[derive(Clone, Debug)]
pub struct CollectRequest {
    pub tenant_id: String,
    pub demand_embedding: Vec<f32>,
    pub top_k: usize,
    pub diversify: bool,
}

/// Collect top-K hyphal memories for a demand embedding. If `diversify`,
/// admits at most one memory per source agent, over-fetching by
/// [`OVER_FETCH_FACTOR`] to have enough candidates to diversify from.
pub async fn collect(
    memory_store: &dyn crate::store::MemoryStore,
    req: CollectRequest,
) -> CoreResult<Vec<crate::domain::MemoryHit>> {
    if req.demand_embedding.len() != crate::domain::EMBEDDING_DIM {
        return Err(CoreError::Validation(format!(
            "demand embedding must be {}-dimensional, got {}",
            crate::domain::EMBEDDING_DIM,
            req.demand_embedding.len()
        )));
    }

    let fetch_limit = if req.diversify { req.top_k * OVER_FETCH_FACTOR } else { req.top_k };
    let hits = memory_store
        .search(&req.tenant_id, &req.demand_embedding, fetch_limit.max(1), None, None, None)
        .await?;

    if !req.diversify {
        return Ok(hits
            .into_iter()
            .take(req.top_k)
            .map(|(memory, similarity)| crate::domain::MemoryHit { memory, similarity })
            .collect());
    }

    let mut seen_agents = std::collections::HashSet::new();
    let mut diversified = Vec::with_capacity(req.top_k);
    for (memory, similarity) in hits {
        if diversified.len() >= req.top_k {
            break;
        }
        if seen_agents.insert(memory.agent_id.clone()) {
            diversified.push(crate::domain::MemoryHit { memory, similarity });
        }
    }
    Ok(diversified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbor_cap_clamps_into_bounds() {
        assert_eq!((5_u64 / NEIGHBOR_CAP_DIVISOR).clamp(NEIGHBOR_CAP_MIN, NEIGHBOR_CAP_MAX), NEIGHBOR_CAP_MIN);
        assert_eq!((10_000_u64 / NEIGHBOR_CAP_DIVISOR).clamp(NEIGHBOR_CAP_MIN, NEIGHBOR_CAP_MAX), NEIGHBOR_CAP_MAX);
    }

    #[test]
    fn rejects_out_of_range_hops_and_ttl() {
        let mut req = BroadcastRequest {
            tenant_id: "t".into(),
            source_agent_id: "a".into(),
            summary: "s".into(),
            embedding: vec![0.0; crate::domain::EMBEDDING_DIM],
            snippets: vec![],
            tool_hints: vec![],
            sensitivity: Sensitivity::Internal,
            ttl_sec: 0,
            max_hops: 3,
            quota_cost: 1,
        };
        assert!(validate_broadcast(&req).is_err());
        req.ttl_sec = 180;
        req.max_hops = 0;
        assert!(validate_broadcast(&req).is_err());
    }
}
