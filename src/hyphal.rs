//! The Hyphal Memory Engine (component D): tenant-scoped embedded
//! knowledge with quality/sensitivity/TTL, answering similarity queries
//! with optional filters.

use tracing::warn;

use crate::domain::{Embedding, HyphalMemory, Sensitivity, RECOGNIZED_MEMORY_KINDS};
use crate::error::{CoreError, CoreResult};
use crate::store::MemoryStore;

pub const SEARCH_TOP_K_BOUND: (u32, u32) = (1, 100);

#[derive(Clone, Debug)]
pub struct StoreMemoryRequest {
    pub tenant_id: String,
    pub agent_id: String,
    pub kind: String,
    pub content: serde_json::Value,
    pub embedding: Vec<f32>,
    pub quality: f64,
    pub sensitivity_raw: String,
    pub ttl_hours: Option<f64>,
    pub metadata: serde_json::Value,
}

fn random_id() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill(&mut bytes);
    format!("mem-{}", hex::encode(bytes))
}

fn validate_embedding(v: &[f32]) -> CoreResult<()> {
    if v.len() != crate::domain::EMBEDDING_DIM {
        return Err(CoreError::Validation(format!(
            "embedding must be {}-dimensional, got {}",
            crate::domain::EMBEDDING_DIM,
            v.len()
        )));
    }
    Ok(())
}

/// Store a memory row, returning its assigned id. Validates embedding
/// shape, normalizes sensitivity, and warns (but does not reject) on an
/// unrecognized kind tag.
pub async fn store(store: &dyn MemoryStore, req: StoreMemoryRequest) -> CoreResult<String> {
    validate_embedding(&req.embedding)?;
    if !(0.0..=1.0).contains(&req.quality) {
        return Err(CoreError::Validation(format!("quality {} must be in [0,1]", req.quality)));
    }

    if !RECOGNIZED_MEMORY_KINDS.contains(&req.kind.as_str()) {
        warn!(kind = %req.kind, "hyphal memory stored with an unrecognized kind tag");
    }

    let sensitivity = Sensitivity::normalize(&req.sensitivity_raw);
    let now = chrono::Utc::now();
    let expires_at = req.ttl_hours.map(|hours| now + chrono::Duration::seconds((hours * 3600.0) as i64));

    let memory = HyphalMemory {
        id: random_id(),
        tenant_id: req.tenant_id,
        agent_id: req.agent_id,
        kind: req.kind,
        content: req.content,
        embedding: Embedding(req.embedding),
        quality: req.quality,
        sensitivity,
        created_at: now,
        expires_at,
        metadata: req.metadata,
    };

    store.store(&memory).await?;
    Ok(memory.id)
}

#[derive(Clone, Debug)]
pub struct SearchMemoryRequest {
    pub tenant_id: String,
    pub embedding: Vec<f32>,
    pub top_k: usize,
    pub min_quality: f64,
    pub kind_filter: Option<String>,
    pub agent_filter: Option<String>,
}

pub async fn search(
    store: &dyn MemoryStore,
    req: SearchMemoryRequest,
) -> CoreResult<Vec<crate::domain::MemoryHit>> {
    validate_embedding(&req.embedding)?;

    let hits = store
        .search(
            &req.tenant_id,
            &req.embedding,
            req.top_k,
            req.kind_filter.as_deref(),
            req.agent_filter.as_deref(),
            Some(req.min_quality),
        )
        .await?;

    Ok(hits
        .into_iter()
        .map(|(memory, similarity)| crate::domain::MemoryHit { memory, similarity })
        .collect())
}

pub async fn get(store: &dyn MemoryStore, tenant_id: &str, id: &str) -> CoreResult<HyphalMemory> {
    store
        .get(tenant_id, id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("hyphal memory {id} not found")))
}

pub async fn delete(store: &dyn MemoryStore, tenant_id: &str, id: &str) -> CoreResult<()> {
    store.delete(tenant_id, id).await
}

pub async fn list_by_agent(
    store: &dyn MemoryStore,
    tenant_id: &str,
    agent_id: &str,
) -> CoreResult<Vec<HyphalMemory>> {
    store.list_by_agent(tenant_id, agent_id).await
}

/// Admin-only: delete every row whose `expires_at` lies in the past.
pub async fn cleanup_expired(store: &dyn MemoryStore, tenant_id: &str) -> CoreResult<u64> {
    store.cleanup_expired(tenant_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_dimension_embedding() {
        assert!(validate_embedding(&vec![0.0; 4]).is_err());
        assert!(validate_embedding(&vec![0.0; crate::domain::EMBEDDING_DIM]).is_ok());
    }

    #[test]
    fn sensitivity_normalizes_unknown_values_to_internal() {
        assert_eq!(Sensitivity::normalize("bogus"), Sensitivity::Internal);
        assert_eq!(Sensitivity::normalize("Secret"), Sensitivity::Secret);
    }

    #[test]
    fn ttl_zero_hours_is_already_expired() {
        let now = chrono::Utc::now();
        let expires_at = now + chrono::Duration::seconds((0.0_f64 * 3600.0) as i64);
        assert!(expires_at <= now);
    }
}
