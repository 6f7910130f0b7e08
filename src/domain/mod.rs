//! The shared data model (spec.md §3): tenants, agents, hyphae, nutrients,
//! route records, hyphal memories, and outcomes.

pub mod embedding;

pub use embedding::{cosine_similarity, remap_cosine_score, Embedding, EMBEDDING_DIM};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TenantId = String;
pub type AgentId = String;

/// `w` is always kept within `[MIN_WEIGHT, MAX_WEIGHT]`.
pub const MIN_WEIGHT: f64 = 0.01;
pub const MAX_WEIGHT: f64 = 1.5;

/// An edge younger than this is never considered for stale deletion.
pub const STALE_EDGE_MIN_WEIGHT: f64 = 0.02;
pub const STALE_EDGE_MAX_AGE_DAYS: f64 = 30.0;

/// Data sensitivity. Rows at `Confidential` or above are encrypted at rest
/// (see `security::aes`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Public,
    Internal,
    Confidential,
    Secret,
}

impl Sensitivity {
    /// Normalize an arbitrary string to the closed set, defaulting to
    /// `Internal` for anything unrecognized.
    pub fn normalize(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "public" => Sensitivity::Public,
            "confidential" => Sensitivity::Confidential,
            "secret" => Sensitivity::Secret,
            _ => Sensitivity::Internal,
        }
    }

    pub fn requires_encryption(self) -> bool {
        matches!(self, Sensitivity::Confidential | Sensitivity::Secret)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sensitivity::Public => "public",
            Sensitivity::Internal => "internal",
            Sensitivity::Confidential => "confidential",
            Sensitivity::Secret => "secret",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Idle,
    Suspended,
}

/// The recognized (but not enforced) set of hyphal-memory kind tags.
pub const RECOGNIZED_MEMORY_KINDS: &[&str] = &[
    "insight",
    "snippet",
    "tool_hint",
    "plan",
    "outcome",
    "result",
    "task",
    "context",
    "memory",
    "agent_result",
];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub tenant_id: TenantId,
    pub name: Option<String>,
    pub capabilities: Vec<String>,
    pub tools: Vec<String>,
    pub profile_embedding: Embedding,
    pub recent_tasks: Vec<String>,
    pub status: AgentStatus,
    pub region: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Bound on the recent-task window kept per agent (spec.md §3: "bounded
/// window").
pub const RECENT_TASKS_WINDOW: usize = 20;

/// A directed, weighted hypha within one tenant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Edge {
    pub tenant_id: TenantId,
    pub src: AgentId,
    pub dst: AgentId,
    pub w: f64,
    pub sim: f64,
    pub r_success: f64,
    pub r_decay: f64,
    pub last_update: DateTime<Utc>,
}

impl Edge {
    pub fn new_born(tenant_id: TenantId, src: AgentId, dst: AgentId) -> Self {
        Edge {
            tenant_id,
            src,
            dst,
            w: 0.1,
            sim: 0.0,
            r_success: 0.0,
            r_decay: 0.0,
            last_update: Utc::now(),
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let days_stale = (now - self.last_update).num_seconds() as f64 / 86_400.0;
        self.w < STALE_EDGE_MIN_WEIGHT && days_stale > STALE_EDGE_MAX_AGE_DAYS
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Nutrient {
    pub id: String,
    pub tenant_id: TenantId,
    pub trace_id: String,
    pub summary: String,
    pub embedding: Embedding,
    pub snippets: Vec<String>,
    pub tool_hints: Vec<String>,
    pub sensitivity: Sensitivity,
    pub current_hop: u32,
    pub max_hops: u32,
    pub ttl_sec: u32,
    pub quota_cost: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Nutrient {
    pub fn can_forward(&self, now: DateTime<Utc>) -> bool {
        self.current_hop < self.max_hops && now < self.expires_at
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteRecord {
    pub tenant_id: TenantId,
    pub nutrient_id: String,
    pub trace_id: String,
    pub src_agent: AgentId,
    pub dst_agent: AgentId,
    pub hop_number: u32,
    pub routing_score: f64,
    pub outcome_score: Option<f64>,
    pub routed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HyphalMemory {
    pub id: String,
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub kind: String,
    pub content: serde_json::Value,
    pub embedding: Embedding,
    pub quality: f64,
    pub sensitivity: Sensitivity,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl HyphalMemory {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// A ranked hyphal-memory search hit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryHit {
    pub memory: HyphalMemory,
    pub similarity: f64,
}

/// An outcome report: either a single uniform score, or a per-destination
/// map. At least one must be present (enforced at the HTTP boundary).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Outcome {
    pub trace_id: String,
    pub uniform_score: Option<f64>,
    pub hop_outcomes: Option<std::collections::HashMap<AgentId, f64>>,
}

impl Outcome {
    /// The effective score for a given destination agent: its per-hop
    /// outcome if present, else the uniform score.
    pub fn score_for(&self, dst: &str) -> Option<f64> {
        if let Some(map) = &self.hop_outcomes {
            if let Some(s) = map.get(dst) {
                return Some(*s);
            }
        }
        self.uniform_score
    }
}
