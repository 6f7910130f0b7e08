//! Lock-free counters/histograms and the Prometheus text endpoint
//! (spec.md §6, SPEC_FULL.md §11.2).

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn install() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

pub fn record_broadcast(tenant_id: &str, routed_count: usize) {
    metrics::counter!("mycelium_broadcasts_total", "tenant" => tenant_id.to_string()).increment(1);
    metrics::histogram!("mycelium_broadcast_routed_count", "tenant" => tenant_id.to_string())
        .record(routed_count as f64);
}

pub fn record_collect(tenant_id: &str, hit_count: usize) {
    metrics::counter!("mycelium_collects_total", "tenant" => tenant_id.to_string()).increment(1);
    metrics::histogram!("mycelium_collect_hit_count", "tenant" => tenant_id.to_string())
        .record(hit_count as f64);
}

pub fn record_outcome(tenant_id: &str, edges_updated: usize) {
    metrics::counter!("mycelium_outcomes_total", "tenant" => tenant_id.to_string()).increment(1);
    metrics::histogram!("mycelium_outcome_edges_updated", "tenant" => tenant_id.to_string())
        .record(edges_updated as f64);
}

pub fn record_routing_latency(seconds: f64) {
    metrics::histogram!("mycelium_routing_latency_seconds").record(seconds);
}

pub fn record_decay_tick(decayed: u64, deleted: u64) {
    metrics::counter!("mycelium_decay_edges_decayed_total").increment(decayed);
    metrics::counter!("mycelium_decay_edges_deleted_total").increment(deleted);
}

pub fn record_rate_limited(tenant_id: &str) {
    metrics::counter!("mycelium_rate_limited_total", "tenant" => tenant_id.to_string()).increment(1);
}

pub fn record_quota_exceeded(tenant_id: &str) {
    metrics::counter!("mycelium_quota_exceeded_total", "tenant" => tenant_id.to_string()).increment(1);
}
