//! Signed, append-only audit trail for route and outcome credit events
//! (spec.md §6/§9, SPEC_FULL.md §11.3).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::identity::SigningIdentity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    pub trace_id: String,
    pub action: String,
    pub detail: serde_json::Value,
    pub signature: String,
    pub signer_pubkey: String,
}

/// Thread-safe, signed audit logger. Events are never removed once
/// recorded; `forget_tenant_index` only drops the lookup index, matching
/// the append-only contract of an audit trail.
pub struct AuditLogger {
    identity: SigningIdentity,
    events: RwLock<Vec<AuditEvent>>,
    tenant_index: RwLock<HashMap<String, Vec<usize>>>,
}

impl AuditLogger {
    pub fn new(identity: SigningIdentity) -> Self {
        AuditLogger {
            identity,
            events: RwLock::new(Vec::new()),
            tenant_index: RwLock::new(HashMap::new()),
        }
    }

    fn canonical_payload(tenant_id: &str, trace_id: &str, action: &str, detail: &serde_json::Value) -> Vec<u8> {
        format!("{tenant_id}|{trace_id}|{action}|{detail}").into_bytes()
    }

    pub fn record(&self, tenant_id: &str, trace_id: &str, action: &str, detail: serde_json::Value) -> AuditEvent {
        let payload = Self::canonical_payload(tenant_id, trace_id, action, &detail);
        let signature = self.identity.sign(&payload);

        let event = AuditEvent {
            id: uuid_like_id(),
            timestamp: Utc::now(),
            tenant_id: tenant_id.to_string(),
            trace_id: trace_id.to_string(),
            action: action.to_string(),
            detail,
            signature,
            signer_pubkey: self.identity.pubkey_hex.clone(),
        };

        let mut events = self.events.write();
        let idx = events.len();
        events.push(event.clone());

        let mut index = self.tenant_index.write();
        index.entry(tenant_id.to_string()).or_default().push(idx);

        event
    }

    pub fn verify(&self, event: &AuditEvent) -> bool {
        let payload = Self::canonical_payload(&event.tenant_id, &event.trace_id, &event.action, &event.detail);
        super::identity::verify(&event.signer_pubkey, &payload, &event.signature).unwrap_or(false)
    }

    pub fn events_for_tenant(&self, tenant_id: &str) -> Vec<AuditEvent> {
        let events = self.events.read();
        let index = self.tenant_index.read();
        index
            .get(tenant_id)
            .map(|indices| indices.iter().filter_map(|&i| events.get(i).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.events.read().len()
    }
}

fn uuid_like_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("audit-{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_events_verify_and_are_tenant_indexed() {
        let logger = AuditLogger::new(SigningIdentity::from_seed("audit-test"));
        let event = logger.record("tenant-a", "trace-1", "route.credit", serde_json::json!({"w": 0.2}));
        assert!(logger.verify(&event));

        let for_a = logger.events_for_tenant("tenant-a");
        assert_eq!(for_a.len(), 1);
        assert!(logger.events_for_tenant("tenant-b").is_empty());
    }

    #[test]
    fn canonical_payload_is_invariant_to_key_insertion_order() {
        let logger = AuditLogger::new(SigningIdentity::from_seed("audit-test"));

        let mut detail_a = serde_json::Map::new();
        detail_a.insert("w".to_string(), serde_json::json!(0.2));
        detail_a.insert("agent".to_string(), serde_json::json!("scout"));
        let detail_a = serde_json::Value::Object(detail_a);

        let mut detail_b = serde_json::Map::new();
        detail_b.insert("agent".to_string(), serde_json::json!("scout"));
        detail_b.insert("w".to_string(), serde_json::json!(0.2));
        let detail_b = serde_json::Value::Object(detail_b);

        let payload_a = AuditLogger::canonical_payload("tenant-a", "trace-1", "route.credit", &detail_a);
        let payload_b = AuditLogger::canonical_payload("tenant-a", "trace-1", "route.credit", &detail_b);
        assert_eq!(payload_a, payload_b, "reordering keys must not change the signed payload");

        let event_a = logger.record("tenant-a", "trace-1", "route.credit", detail_a);
        assert!(logger.verify(&event_a));
        let event_b = logger.record("tenant-a", "trace-1", "route.credit", detail_b);
        assert!(logger.verify(&event_b));
    }
}
