//! Sqlite-backed [`GraphStore`]: agents, edges, nutrients, and route
//! records, each row scoped by `tenant_id`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::domain::{Agent, AgentStatus, Edge, Nutrient, RouteRecord, Sensitivity};
use crate::error::{CoreError, CoreResult};

use super::GraphStore;

pub type SqlitePool = Pool<SqliteConnectionManager>;

pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(db_path: &str, min_idle: u32, max_size: u32) -> CoreResult<Self> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        });
        let pool = Pool::builder()
            .min_idle(Some(min_idle))
            .max_size(max_size)
            .build(manager)
            .map_err(|e| CoreError::Config(format!("graph store pool init: {e}")))?;

        let store = SqliteGraphStore { pool };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT,
                capabilities TEXT NOT NULL,
                tools TEXT NOT NULL,
                profile_embedding TEXT NOT NULL,
                recent_tasks TEXT NOT NULL,
                status TEXT NOT NULL,
                region TEXT,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, id)
            );

            CREATE TABLE IF NOT EXISTS edges (
                tenant_id TEXT NOT NULL,
                src TEXT NOT NULL,
                dst TEXT NOT NULL,
                w REAL NOT NULL,
                sim REAL NOT NULL,
                r_success REAL NOT NULL,
                r_decay REAL NOT NULL,
                last_update TEXT NOT NULL,
                PRIMARY KEY (tenant_id, src, dst)
            );
            CREATE INDEX IF NOT EXISTS idx_edges_src ON edges (tenant_id, src);

            CREATE TABLE IF NOT EXISTS nutrients_active (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                trace_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                embedding TEXT NOT NULL,
                snippets TEXT NOT NULL,
                tool_hints TEXT NOT NULL,
                sensitivity TEXT NOT NULL,
                current_hop INTEGER NOT NULL,
                max_hops INTEGER NOT NULL,
                ttl_sec INTEGER NOT NULL,
                quota_cost INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, id)
            );

            CREATE TABLE IF NOT EXISTS nutrient_routes (
                tenant_id TEXT NOT NULL,
                nutrient_id TEXT NOT NULL,
                trace_id TEXT NOT NULL,
                src_agent TEXT NOT NULL,
                dst_agent TEXT NOT NULL,
                hop_number INTEGER NOT NULL,
                routing_score REAL NOT NULL,
                outcome_score REAL,
                routed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_routes_trace ON nutrient_routes (tenant_id, trace_id);

            CREATE TABLE IF NOT EXISTS api_keys (
                key_hash TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                scopes TEXT NOT NULL,
                rate_limit_per_min INTEGER NOT NULL,
                quota_per_min INTEGER NOT NULL DEFAULT 1000,
                quota_per_hour INTEGER NOT NULL DEFAULT 20000,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<Agent> {
    let status_str: String = row.get("status")?;
    let status = match status_str.as_str() {
        "idle" => AgentStatus::Idle,
        "suspended" => AgentStatus::Suspended,
        _ => AgentStatus::Active,
    };
    let embedding_json: String = row.get("profile_embedding")?;
    let embedding = serde_json::from_str(&embedding_json).unwrap_or_default();

    Ok(Agent {
        tenant_id: row.get("tenant_id")?,
        id: row.get("id")?,
        name: row.get("name")?,
        capabilities: serde_json::from_str(&row.get::<_, String>("capabilities")?).unwrap_or_default(),
        tools: serde_json::from_str(&row.get::<_, String>("tools")?).unwrap_or_default(),
        profile_embedding: crate::domain::Embedding(embedding),
        recent_tasks: serde_json::from_str(&row.get::<_, String>("recent_tasks")?).unwrap_or_default(),
        status,
        region: row.get("region")?,
        metadata: serde_json::from_str(&row.get::<_, String>("metadata")?).unwrap_or(serde_json::Value::Null),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
    Ok(Edge {
        tenant_id: row.get("tenant_id")?,
        src: row.get("src")?,
        dst: row.get("dst")?,
        w: row.get("w")?,
        sim: row.get("sim")?,
        r_success: row.get("r_success")?,
        r_decay: row.get("r_decay")?,
        last_update: row.get("last_update")?,
    })
}

fn row_to_nutrient(row: &rusqlite::Row) -> rusqlite::Result<Nutrient> {
    let embedding_json: String = row.get("embedding")?;
    let sensitivity_str: String = row.get("sensitivity")?;
    Ok(Nutrient {
        tenant_id: row.get("tenant_id")?,
        id: row.get("id")?,
        trace_id: row.get("trace_id")?,
        summary: row.get("summary")?,
        embedding: crate::domain::Embedding(serde_json::from_str(&embedding_json).unwrap_or_default()),
        snippets: serde_json::from_str(&row.get::<_, String>("snippets")?).unwrap_or_default(),
        tool_hints: serde_json::from_str(&row.get::<_, String>("tool_hints")?).unwrap_or_default(),
        sensitivity: Sensitivity::normalize(&sensitivity_str),
        current_hop: row.get::<_, i64>("current_hop")? as u32,
        max_hops: row.get::<_, i64>("max_hops")? as u32,
        ttl_sec: row.get::<_, i64>("ttl_sec")? as u32,
        quota_cost: row.get::<_, i64>("quota_cost")? as u32,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
    })
}

fn row_to_route(row: &rusqlite::Row) -> rusqlite::Result<RouteRecord> {
    Ok(RouteRecord {
        tenant_id: row.get("tenant_id")?,
        nutrient_id: row.get("nutrient_id")?,
        trace_id: row.get("trace_id")?,
        src_agent: row.get("src_agent")?,
        dst_agent: row.get("dst_agent")?,
        hop_number: row.get::<_, i64>("hop_number")? as u32,
        routing_score: row.get("routing_score")?,
        outcome_score: row.get("outcome_score")?,
        routed_at: row.get("routed_at")?,
    })
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_agent(&self, agent: &Agent) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO agents (tenant_id, id, name, capabilities, tools, profile_embedding,
                recent_tasks, status, region, metadata, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
             ON CONFLICT(tenant_id, id) DO UPDATE SET
                name=excluded.name, capabilities=excluded.capabilities, tools=excluded.tools,
                profile_embedding=excluded.profile_embedding, recent_tasks=excluded.recent_tasks,
                status=excluded.status, region=excluded.region, metadata=excluded.metadata,
                updated_at=excluded.updated_at",
            params![
                agent.tenant_id,
                agent.id,
                agent.name,
                serde_json::to_string(&agent.capabilities)?,
                serde_json::to_string(&agent.tools)?,
                serde_json::to_string(&agent.profile_embedding.0)?,
                serde_json::to_string(&agent.recent_tasks)?,
                match agent.status {
                    AgentStatus::Active => "active",
                    AgentStatus::Idle => "idle",
                    AgentStatus::Suspended => "suspended",
                },
                agent.region,
                serde_json::to_string(&agent.metadata)?,
                agent.created_at,
                agent.updated_at,
            ],
        )?;
        Ok(())
    }

    async fn get_agent(&self, tenant_id: &str, agent_id: &str) -> CoreResult<Option<Agent>> {
        let conn = self.pool.get()?;
        let agent = conn
            .query_row(
                "SELECT * FROM agents WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, agent_id],
                row_to_agent,
            )
            .optional()?;
        Ok(agent)
    }

    async fn get_agents(&self, tenant_id: &str, agent_ids: &[String]) -> CoreResult<Vec<Agent>> {
        if agent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.pool.get()?;
        let placeholders = std::iter::repeat("?").take(agent_ids.len()).collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM agents WHERE tenant_id = ? AND id IN ({placeholders})");

        let mut values: Vec<String> = Vec::with_capacity(agent_ids.len() + 1);
        values.push(tenant_id.to_string());
        values.extend(agent_ids.iter().cloned());
        let bound: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(bound.as_slice(), row_to_agent)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    async fn list_agents(&self, tenant_id: &str) -> CoreResult<Vec<Agent>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT * FROM agents WHERE tenant_id = ?1")?;
        let rows = stmt.query_map(params![tenant_id], row_to_agent)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    async fn deactivate_agent(&self, tenant_id: &str, agent_id: &str) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE agents SET status = 'suspended', updated_at = ?3 WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id, agent_id, Utc::now()],
        )?;
        Ok(())
    }

    async fn get_edge(&self, tenant_id: &str, src: &str, dst: &str) -> CoreResult<Option<Edge>> {
        let conn = self.pool.get()?;
        let edge = conn
            .query_row(
                "SELECT * FROM edges WHERE tenant_id = ?1 AND src = ?2 AND dst = ?3",
                params![tenant_id, src, dst],
                row_to_edge,
            )
            .optional()?;
        Ok(edge)
    }

    async fn upsert_edge(&self, edge: &Edge) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO edges (tenant_id, src, dst, w, sim, r_success, r_decay, last_update)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(tenant_id, src, dst) DO UPDATE SET
                w=excluded.w, sim=excluded.sim, r_success=excluded.r_success,
                r_decay=excluded.r_decay, last_update=excluded.last_update",
            params![
                edge.tenant_id,
                edge.src,
                edge.dst,
                edge.w,
                edge.sim,
                edge.r_success,
                edge.r_decay,
                edge.last_update,
            ],
        )?;
        Ok(())
    }

    async fn update_edge_with(
        &self,
        tenant_id: &str,
        src: &str,
        dst: &str,
        f: Box<dyn FnOnce(Option<Edge>) -> Edge + Send>,
    ) -> CoreResult<(Option<Edge>, Edge)> {
        let mut conn = self.pool.get()?;
        // BEGIN IMMEDIATE takes the write lock up front, so two concurrent
        // callers against the same edge serialize here instead of racing a
        // lost update between their reads and writes.
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                "SELECT * FROM edges WHERE tenant_id = ?1 AND src = ?2 AND dst = ?3",
                params![tenant_id, src, dst],
                row_to_edge,
            )
            .optional()?;

        let edge = f(existing.clone());

        tx.execute(
            "INSERT INTO edges (tenant_id, src, dst, w, sim, r_success, r_decay, last_update)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(tenant_id, src, dst) DO UPDATE SET
                w=excluded.w, sim=excluded.sim, r_success=excluded.r_success,
                r_decay=excluded.r_decay, last_update=excluded.last_update",
            params![
                edge.tenant_id,
                edge.src,
                edge.dst,
                edge.w,
                edge.sim,
                edge.r_success,
                edge.r_decay,
                edge.last_update,
            ],
        )?;

        tx.commit()?;
        Ok((existing, edge))
    }

    async fn neighbors_of(&self, tenant_id: &str, src: &str) -> CoreResult<Vec<Edge>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT * FROM edges WHERE tenant_id = ?1 AND src = ?2")?;
        let rows = stmt.query_map(params![tenant_id, src], row_to_edge)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    async fn count_tenant_edges(&self, tenant_id: &str) -> CoreResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE tenant_id = ?1",
            params![tenant_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    async fn top_edges(&self, tenant_id: &str, limit: usize) -> CoreResult<Vec<Edge>> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT * FROM edges WHERE tenant_id = ?1 ORDER BY w DESC LIMIT ?2")?;
        let rows = stmt.query_map(params![tenant_id, limit as i64], row_to_edge)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    async fn delete_edge(&self, tenant_id: &str, src: &str, dst: &str) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM edges WHERE tenant_id = ?1 AND src = ?2 AND dst = ?3",
            params![tenant_id, src, dst],
        )?;
        Ok(())
    }

    async fn scan_all_edges(&self, tenant_id: &str) -> CoreResult<Vec<Edge>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT * FROM edges WHERE tenant_id = ?1")?;
        let rows = stmt.query_map(params![tenant_id], row_to_edge)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    async fn insert_nutrient(&self, nutrient: &Nutrient) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO nutrients_active (tenant_id, id, trace_id, summary, embedding, snippets,
                tool_hints, sensitivity, current_hop, max_hops, ttl_sec, quota_cost, created_at, expires_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
             ON CONFLICT(tenant_id, id) DO UPDATE SET current_hop=excluded.current_hop",
            params![
                nutrient.tenant_id,
                nutrient.id,
                nutrient.trace_id,
                nutrient.summary,
                serde_json::to_string(&nutrient.embedding.0)?,
                serde_json::to_string(&nutrient.snippets)?,
                serde_json::to_string(&nutrient.tool_hints)?,
                nutrient.sensitivity.as_str(),
                nutrient.current_hop,
                nutrient.max_hops,
                nutrient.ttl_sec,
                nutrient.quota_cost,
                nutrient.created_at,
                nutrient.expires_at,
            ],
        )?;
        Ok(())
    }

    async fn get_nutrient(&self, tenant_id: &str, id: &str) -> CoreResult<Option<Nutrient>> {
        let conn = self.pool.get()?;
        let nutrient = conn
            .query_row(
                "SELECT * FROM nutrients_active WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, id],
                row_to_nutrient,
            )
            .optional()?;
        Ok(nutrient)
    }

    async fn update_nutrient_hop(&self, tenant_id: &str, id: &str, hop: u32) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE nutrients_active SET current_hop = ?3 WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id, id, hop],
        )?;
        Ok(())
    }

    async fn delete_expired_nutrients(&self, tenant_id: &str) -> CoreResult<u64> {
        let conn = self.pool.get()?;
        let now: DateTime<Utc> = Utc::now();
        let affected = conn.execute(
            "DELETE FROM nutrients_active WHERE tenant_id = ?1 AND expires_at <= ?2",
            params![tenant_id, now],
        )?;
        Ok(affected as u64)
    }

    async fn insert_route_record(&self, record: &RouteRecord) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO nutrient_routes (tenant_id, nutrient_id, trace_id, src_agent, dst_agent,
                hop_number, routing_score, outcome_score, routed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                record.tenant_id,
                record.nutrient_id,
                record.trace_id,
                record.src_agent,
                record.dst_agent,
                record.hop_number,
                record.routing_score,
                record.outcome_score,
                record.routed_at,
            ],
        )?;
        Ok(())
    }

    async fn routes_for_trace(&self, tenant_id: &str, trace_id: &str) -> CoreResult<Vec<RouteRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM nutrient_routes WHERE tenant_id = ?1 AND trace_id = ?2 ORDER BY hop_number ASC",
        )?;
        let rows = stmt.query_map(params![tenant_id, trace_id], row_to_route)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    async fn update_route_outcome(
        &self,
        tenant_id: &str,
        trace_id: &str,
        dst_agent: &str,
        outcome_score: f64,
    ) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE nutrient_routes SET outcome_score = ?4
             WHERE tenant_id = ?1 AND trace_id = ?2 AND dst_agent = ?3",
            params![tenant_id, trace_id, dst_agent, outcome_score],
        )?;
        Ok(())
    }

    async fn health_check(&self) -> CoreResult<()> {
        let conn = self.pool.get()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    async fn lookup_api_key(&self, key_hash: &str) -> CoreResult<Option<super::ApiKeyRecord>> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                "SELECT tenant_id, scopes, rate_limit_per_min, quota_per_min, quota_per_hour
                 FROM api_keys WHERE key_hash = ?1",
                params![key_hash],
                |row| {
                    let scopes_json: String = row.get("scopes")?;
                    Ok(super::ApiKeyRecord {
                        tenant_id: row.get("tenant_id")?,
                        scopes: serde_json::from_str(&scopes_json).unwrap_or_default(),
                        rate_limit_per_min: row.get::<_, i64>("rate_limit_per_min")? as u32,
                        quota_per_min: row.get::<_, i64>("quota_per_min")? as u32,
                        quota_per_hour: row.get::<_, i64>("quota_per_hour")? as u32,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    async fn list_tenants(&self) -> CoreResult<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT tenant_id FROM agents UNION SELECT tenant_id FROM edges",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentStatus, Embedding, EMBEDDING_DIM};

    fn test_store() -> SqliteGraphStore {
        let file = tempfile::NamedTempFile::new().unwrap();
        SqliteGraphStore::new(file.path().to_str().unwrap(), 1, 4).unwrap()
    }

    #[tokio::test]
    async fn upserts_and_fetches_an_agent() {
        let store = test_store();
        let now = Utc::now();
        let agent = Agent {
            id: "agent-1".into(),
            tenant_id: "tenant-a".into(),
            name: Some("Scout".into()),
            capabilities: vec!["search".into()],
            tools: vec![],
            profile_embedding: Embedding(vec![0.0; EMBEDDING_DIM]),
            recent_tasks: vec![],
            status: AgentStatus::Active,
            region: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        store.upsert_agent(&agent).await.unwrap();

        let fetched = store.get_agent("tenant-a", "agent-1").await.unwrap().unwrap();
        assert_eq!(fetched.name.as_deref(), Some("Scout"));

        let other_tenant = store.get_agent("tenant-b", "agent-1").await.unwrap();
        assert!(other_tenant.is_none());
    }

    #[tokio::test]
    async fn edge_roundtrip_and_top_edges_orders_by_weight() {
        let store = test_store();
        let e1 = Edge { w: 0.9, ..Edge::new_born("t".into(), "a".into(), "b".into()) };
        let e2 = Edge { w: 0.2, ..Edge::new_born("t".into(), "a".into(), "c".into()) };
        store.upsert_edge(&e1).await.unwrap();
        store.upsert_edge(&e2).await.unwrap();

        let top = store.top_edges("t", 10).await.unwrap();
        assert_eq!(top[0].dst, "b");
        assert_eq!(store.count_tenant_edges("t").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn bulk_fetches_agents_and_skips_missing_ids() {
        let store = test_store();
        let now = Utc::now();
        for id in ["agent-1", "agent-2"] {
            store
                .upsert_agent(&Agent {
                    id: id.into(),
                    tenant_id: "tenant-a".into(),
                    name: None,
                    capabilities: vec![],
                    tools: vec![],
                    profile_embedding: Embedding(vec![0.0; EMBEDDING_DIM]),
                    recent_tasks: vec![],
                    status: AgentStatus::Active,
                    region: None,
                    metadata: serde_json::json!({}),
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }

        let ids = vec!["agent-1".to_string(), "agent-2".to_string(), "ghost".to_string()];
        let fetched = store.get_agents("tenant-a", &ids).await.unwrap();
        assert_eq!(fetched.len(), 2);

        let empty = store.get_agents("tenant-a", &[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn update_edge_with_creates_then_updates_atomically() {
        let store = test_store();

        let (prior, created) = store
            .update_edge_with(
                "t",
                "a",
                "b",
                Box::new(|existing| {
                    assert!(existing.is_none());
                    Edge::new_born("t".into(), "a".into(), "b".into())
                }),
            )
            .await
            .unwrap();
        assert!(prior.is_none());
        assert_eq!(created.w, 0.1);

        let (prior, updated) = store
            .update_edge_with(
                "t",
                "a",
                "b",
                Box::new(|existing| {
                    let mut e = existing.expect("edge created above");
                    e.w += 0.1;
                    e
                }),
            )
            .await
            .unwrap();
        assert_eq!(prior.unwrap().w, 0.1);
        assert!((updated.w - 0.2).abs() < 1e-9);
    }
}
