//! Qdrant-backed ANN vector storage.
//!
//! Backs both the raw [`VectorStore`] trait and the tenant-scoped
//! [`MemoryStore`] used by the Hyphal Memory Engine: hyphal memories are
//! stored as points whose payload carries the full memory record, so a
//! search response never needs a second round-trip to the Graph Store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::HyphalMemory;
use crate::error::{CoreError, CoreResult};

use super::{MemoryStore, SearchResult, VectorStore};

pub struct QdrantVectorStore {
    client: Arc<RwLock<Option<Qdrant>>>,
    url: String,
    collection: String,
    vector_size: u64,
}

impl QdrantVectorStore {
    pub fn new(url: &str, collection: &str, vector_size: usize) -> Self {
        QdrantVectorStore {
            client: Arc::new(RwLock::new(None)),
            url: url.to_string(),
            collection: collection.to_string(),
            vector_size: vector_size as u64,
        }
    }

    async fn get_client(&self) -> CoreResult<Qdrant> {
        {
            let c = self.client.read().await;
            if let Some(ref client) = *c {
                return Ok(client.clone());
            }
        }

        let client = Qdrant::from_url(&self.url)
            .build()
            .map_err(|e| CoreError::Unavailable(format!("qdrant connect: {e}")))?;

        let collections = client
            .list_collections()
            .await
            .map_err(|e| CoreError::Unavailable(format!("qdrant list_collections: {e}")))?;

        let exists = collections.collections.iter().any(|c| c.name == self.collection);

        if !exists {
            client
                .create_collection(
                    CreateCollectionBuilder::new(self.collection.clone())
                        .vectors_config(VectorParamsBuilder::new(self.vector_size, Distance::Cosine)),
                )
                .await
                .map_err(|e| CoreError::Unavailable(format!("qdrant create_collection: {e}")))?;

            info!(collection = %self.collection, size = self.vector_size, "created qdrant collection");
        }

        {
            let mut c = self.client.write().await;
            *c = Some(client.clone());
        }

        Ok(client)
    }

    fn payload_to_json(payload: &HashMap<String, qdrant_client::qdrant::Value>) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = payload
            .iter()
            .filter_map(|(k, v)| qdrant_value_to_json(v).map(|j| (k.clone(), j)))
            .collect();
        serde_json::Value::Object(map)
    }
}

fn qdrant_value_to_json(v: &qdrant_client::qdrant::Value) -> Option<serde_json::Value> {
    serde_json::from_str(&serde_json::to_string(v).ok()?).ok()
}

fn json_to_payload(value: serde_json::Value) -> HashMap<String, qdrant_client::qdrant::Value> {
    let mut out = HashMap::new();
    if let serde_json::Value::Object(map) = value {
        for (k, v) in map {
            let qv: qdrant_client::qdrant::Value = match v {
                serde_json::Value::String(s) => s.into(),
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        i.into()
                    } else {
                        n.as_f64().unwrap_or(0.0).into()
                    }
                }
                serde_json::Value::Bool(b) => b.into(),
                other => serde_json::to_string(&other).unwrap_or_default().into(),
            };
            out.insert(k, qv);
        }
    }
    out
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        payload: Option<serde_json::Value>,
    ) -> CoreResult<()> {
        let client = self.get_client().await?;
        let payload_map = payload.map(json_to_payload).unwrap_or_default();
        let point = PointStruct::new(id.to_string(), vector, payload_map);

        client
            .upsert_points(UpsertPointsBuilder::new(self.collection.clone(), vec![point]))
            .await
            .map_err(|e| CoreError::Unavailable(format!("qdrant upsert: {e}")))?;

        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<serde_json::Value>,
    ) -> CoreResult<Vec<SearchResult>> {
        let client = self.get_client().await?;

        let mut builder = SearchPointsBuilder::new(self.collection.clone(), vector, limit as u64)
            .with_payload(true);

        if let Some(serde_json::Value::Object(map)) = filter {
            let mut conditions = Vec::new();
            for (key, val) in map {
                if let serde_json::Value::String(s) = val {
                    conditions.push(Condition::matches(key, s));
                }
            }
            if !conditions.is_empty() {
                builder = builder.filter(Filter::must(conditions));
            }
        }

        let results = client
            .search_points(builder)
            .await
            .map_err(|e| CoreError::Unavailable(format!("qdrant search: {e}")))?;

        Ok(results
            .result
            .into_iter()
            .map(|r| {
                let id = match r.id {
                    Some(point_id) => format!("{point_id:?}"),
                    None => "unknown".to_string(),
                };
                SearchResult {
                    id,
                    score: r.score,
                    payload: Some(Self::payload_to_json(&r.payload)),
                }
            })
            .collect())
    }

    async fn delete(&self, id: &str) -> CoreResult<()> {
        let client = self.get_client().await?;
        let point_id: PointId = PointId::from(id.to_string());
        client
            .delete_points(DeletePointsBuilder::new(self.collection.clone()).points(vec![point_id]))
            .await
            .map_err(|e| CoreError::Unavailable(format!("qdrant delete: {e}")))?;
        Ok(())
    }

    async fn health_check(&self) -> CoreResult<()> {
        let client = self.get_client().await?;
        client
            .list_collections()
            .await
            .map_err(|e| CoreError::Unavailable(format!("qdrant health check: {e}")))?;
        Ok(())
    }
}

/// Point id namespacing so hyphal memories from different tenants can share
/// one Qdrant collection without a collision.
fn point_id(tenant_id: &str, memory_id: &str) -> String {
    format!("{tenant_id}:{memory_id}")
}

/// [`MemoryStore`] implementation over a [`QdrantVectorStore`], encoding the
/// full [`HyphalMemory`] — embedding included — into the point payload, so
/// every read path decodes a complete, uncorrupted record straight back out
/// rather than needing a second source for the vector.
pub struct QdrantMemoryStore {
    inner: Arc<QdrantVectorStore>,
}

impl QdrantMemoryStore {
    pub fn new(inner: Arc<QdrantVectorStore>) -> Self {
        QdrantMemoryStore { inner }
    }
}

fn encode_memory(memory: &HyphalMemory) -> CoreResult<serde_json::Value> {
    serde_json::to_value(memory).map_err(CoreError::from)
}

fn decode_memory(payload: serde_json::Value) -> CoreResult<HyphalMemory> {
    serde_json::from_value(payload).map_err(CoreError::from)
}

#[async_trait]
impl MemoryStore for QdrantMemoryStore {
    async fn store(&self, memory: &HyphalMemory) -> CoreResult<()> {
        let payload = encode_memory(memory)?;
        self.inner
            .upsert(
                &point_id(&memory.tenant_id, &memory.id),
                memory.embedding.as_slice().to_vec(),
                Some(payload),
            )
            .await
    }

    async fn get(&self, tenant_id: &str, id: &str) -> CoreResult<Option<HyphalMemory>> {
        // Qdrant has no direct "get by id with vector" in the trait above;
        // search is used elsewhere. A point-id filtered search with a
        // neutral query vector approximates a fetch.
        let results = self
            .inner
            .search(
                vec![0.0_f32; crate::domain::EMBEDDING_DIM],
                1,
                Some(serde_json::json!({ "id": id, "tenant_id": tenant_id })),
            )
            .await?;
        match results.into_iter().next() {
            Some(r) if r.payload.is_some() => Ok(Some(decode_memory(r.payload.unwrap())?)),
            _ => Ok(None),
        }
    }

    async fn delete(&self, tenant_id: &str, id: &str) -> CoreResult<()> {
        self.inner.delete(&point_id(tenant_id, id)).await
    }

    async fn list_by_agent(&self, tenant_id: &str, agent_id: &str) -> CoreResult<Vec<HyphalMemory>> {
        let results = self
            .inner
            .search(
                vec![0.0_f32; crate::domain::EMBEDDING_DIM],
                256,
                Some(serde_json::json!({ "tenant_id": tenant_id, "agent_id": agent_id })),
            )
            .await?;
        results.into_iter().filter_map(|r| r.payload.map(decode_memory)).collect()
    }

    async fn cleanup_expired(&self, tenant_id: &str) -> CoreResult<u64> {
        let all = self
            .inner
            .search(
                vec![0.0_f32; crate::domain::EMBEDDING_DIM],
                4096,
                Some(serde_json::json!({ "tenant_id": tenant_id })),
            )
            .await?;

        let now = chrono::Utc::now();
        let mut deleted = 0u64;
        for r in all {
            if let Some(payload) = r.payload {
                if let Ok(mem) = decode_memory(payload) {
                    if mem.is_expired(now) {
                        self.delete(tenant_id, &mem.id).await?;
                        deleted += 1;
                    }
                }
            }
        }
        Ok(deleted)
    }

    async fn search(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        limit: usize,
        kind: Option<&str>,
        agent_id: Option<&str>,
        min_quality: Option<f64>,
    ) -> CoreResult<Vec<(HyphalMemory, f64)>> {
        let mut filter = serde_json::Map::new();
        filter.insert("tenant_id".into(), serde_json::Value::String(tenant_id.to_string()));
        if let Some(k) = kind {
            filter.insert("kind".into(), serde_json::Value::String(k.to_string()));
        }
        if let Some(a) = agent_id {
            filter.insert("agent_id".into(), serde_json::Value::String(a.to_string()));
        }

        let results = self
            .inner
            .search(
                embedding.to_vec(),
                limit.max(1) * 3,
                Some(serde_json::Value::Object(filter)),
            )
            .await?;

        let mut hits = Vec::new();
        for r in results {
            let Some(payload) = r.payload else { continue };
            let mem = decode_memory(payload)?;
            if let Some(min_q) = min_quality {
                if mem.quality < min_q {
                    continue;
                }
            }
            if mem.is_expired(chrono::Utc::now()) {
                continue;
            }
            // Same [0,1] remap domain::embedding::cosine_similarity uses, so
            // hyphal-memory scores and routing scores stay comparable.
            hits.push((mem, crate::domain::remap_cosine_score(r.score)));
            if hits.len() >= limit {
                break;
            }
        }

        Ok(hits)
    }
}
