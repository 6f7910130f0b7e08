//! The Reinforcement Engine (component E): synaptic-plasticity edge
//! updates, credit assignment, and background time-decay.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::{Edge, Outcome, MAX_WEIGHT, MIN_WEIGHT};
use crate::error::{retry_transient, CoreError, CoreResult};
use crate::store::GraphStore;

pub const ALPHA_POS: f64 = 0.08;
pub const ALPHA_NEG: f64 = 0.04;
pub const LAMBDA_DECAY: f64 = 0.002;
pub const LAMBDA_TIME: f64 = 0.01;
pub const TIME_DECAY_INTERVAL_SECS: u64 = 3600;

/// `Δ = α_pos·o − α_neg·(1−o) − λ_decay`, clamped into `[MIN_WEIGHT, MAX_WEIGHT]`.
pub fn plasticity_delta(outcome: f64) -> f64 {
    ALPHA_POS * outcome - ALPHA_NEG * (1.0 - outcome) - LAMBDA_DECAY
}

pub fn apply_plasticity(edge: &mut Edge, outcome: f64, now: chrono::DateTime<chrono::Utc>) -> f64 {
    let delta = plasticity_delta(outcome);
    let new_w = (edge.w + delta).clamp(MIN_WEIGHT, MAX_WEIGHT);
    edge.w = new_w;
    edge.r_success += outcome;
    edge.r_decay += 1.0 - outcome;
    edge.last_update = now;
    delta
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeUpdate {
    pub src: String,
    pub dst: String,
    pub old_w: f64,
    pub new_w: f64,
    pub delta: f64,
    pub hop: u32,
    pub hop_score: f64,
}

/// Credit an outcome report against the route log for `trace_id`.
/// Returns 404 (as `CoreError::NotFound`) if the trace has no route
/// records at all.
pub async fn credit_outcome(
    store: &dyn GraphStore,
    tenant_id: &str,
    outcome: &Outcome,
) -> CoreResult<Vec<EdgeUpdate>> {
    let routes = retry_transient(|| store.routes_for_trace(tenant_id, &outcome.trace_id)).await?;
    if routes.is_empty() {
        return Err(CoreError::NotFound(format!("no route records for trace {}", outcome.trace_id)));
    }

    let mut updates = Vec::with_capacity(routes.len());
    let now = chrono::Utc::now();

    for record in routes {
        let hop_score = outcome.score_for(&record.dst_agent).ok_or_else(|| {
            CoreError::Validation(format!(
                "no outcome score available for destination agent {}",
                record.dst_agent
            ))
        })?;
        if !(0.0..=1.0).contains(&hop_score) {
            return Err(CoreError::Validation(format!(
                "hop outcome score {hop_score} out of range [0,1] for {}",
                record.dst_agent
            )));
        }

        // Read-modify-write of the edge happens inside a single
        // `BEGIN IMMEDIATE` sqlite transaction (see `GraphStore::update_edge_with`),
        // so two concurrent credit_outcome calls against the same edge
        // serialize instead of one silently clobbering the other's write.
        let src_agent = record.src_agent.clone();
        let dst_agent = record.dst_agent.clone();
        let tenant = tenant_id.to_string();

        let (prior, edge) = retry_transient(|| {
            let src_agent = src_agent.clone();
            let dst_agent = dst_agent.clone();
            let tenant = tenant.clone();
            async move {
                store
                    .update_edge_with(
                        &tenant,
                        &src_agent,
                        &dst_agent,
                        Box::new(move |existing| {
                            let mut e = existing.unwrap_or_else(|| {
                                Edge::new_born(tenant.clone(), src_agent.clone(), dst_agent.clone())
                            });
                            apply_plasticity(&mut e, hop_score, now);
                            e
                        }),
                    )
                    .await
            }
        })
        .await?;

        let old_w = prior.map(|e| e.w).unwrap_or(0.1);
        let delta = edge.w - old_w;

        retry_transient(|| store.update_route_outcome(tenant_id, &record.trace_id, &record.dst_agent, hop_score))
            .await?;

        updates.push(EdgeUpdate {
            src: record.src_agent,
            dst: record.dst_agent,
            old_w,
            new_w: edge.w,
            delta,
            hop: record.hop_number,
            hop_score,
        });
    }

    Ok(updates)
}

/// One sweep of time-based decay over every edge of one tenant. Returns
/// `(decayed, deleted)` counts.
pub async fn decay_tenant_edges(store: &dyn GraphStore, tenant_id: &str) -> CoreResult<(u64, u64)> {
    let now = chrono::Utc::now();
    let edges = retry_transient(|| store.scan_all_edges(tenant_id)).await?;

    let mut decayed = 0u64;
    let mut deleted = 0u64;

    for mut edge in edges {
        let hours_since_update = (now - edge.last_update).num_seconds() as f64 / 3600.0;
        if hours_since_update < 1.0 {
            continue;
        }

        let days_stale = (now - edge.last_update).num_seconds() as f64 / 86_400.0;
        let w_new = edge.w * (-LAMBDA_TIME * days_stale).exp();

        if w_new < crate::domain::STALE_EDGE_MIN_WEIGHT && days_stale > crate::domain::STALE_EDGE_MAX_AGE_DAYS {
            retry_transient(|| store.delete_edge(tenant_id, &edge.src, &edge.dst)).await?;
            deleted += 1;
        } else if (w_new - edge.w).abs() > f64::EPSILON {
            edge.w = w_new;
            edge.last_update = now;
            retry_transient(|| store.upsert_edge(&edge)).await?;
            decayed += 1;
        }
    }

    Ok((decayed, deleted))
}

/// Spawn the cancellable background decay task, ticking every
/// [`TIME_DECAY_INTERVAL_SECS`]. Each tick re-discovers the live tenant set
/// via [`GraphStore::list_tenants`] and decays every tenant's edges in turn.
/// The returned `watch::Sender` triggers cancellation when dropped or sent
/// `true`; the task awaits its own shutdown within the current tick before
/// returning.
pub fn spawn_decay_task(store: Arc<dyn GraphStore>) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(TIME_DECAY_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tenant_ids = match store.list_tenants().await {
                        Ok(ids) => ids,
                        Err(e) => {
                            error!(error = %e, "decay tick could not list tenants, skipping");
                            continue;
                        }
                    };
                    for tenant_id in tenant_ids {
                        match decay_tenant_edges(store.as_ref(), &tenant_id).await {
                            Ok((decayed, deleted)) => {
                                info!(tenant = %tenant_id, decayed, deleted, "decay tick complete");
                            }
                            Err(e) => {
                                error!(tenant = %tenant_id, error = %e, "decay tick failed, continuing");
                            }
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        warn!("decay task received shutdown signal");
                        break;
                    }
                }
            }
        }
    });

    (shutdown_tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plasticity_is_monotone_in_outcome() {
        let d1 = plasticity_delta(0.2);
        let d2 = plasticity_delta(0.8);
        assert!(d2 > d1);
    }

    #[test]
    fn perfect_success_still_pays_decay_cost() {
        let delta = plasticity_delta(1.0);
        assert!(delta < ALPHA_POS);
    }

    #[test]
    fn example_per_hop_outcome_deltas_match_literal_scenario() {
        let delta_b = plasticity_delta(0.9);
        let delta_c = plasticity_delta(0.1);
        assert!((delta_b - 0.066).abs() < 1e-9);
        assert!((delta_c - (-0.030)).abs() < 1e-9);
    }

    #[test]
    fn weight_stays_within_clamp_bounds() {
        let mut edge = Edge::new_born("t".into(), "a".into(), "b".into());
        edge.w = MAX_WEIGHT - 0.001;
        let now = chrono::Utc::now();
        apply_plasticity(&mut edge, 1.0, now);
        assert!(edge.w <= MAX_WEIGHT);

        edge.w = MIN_WEIGHT + 0.001;
        apply_plasticity(&mut edge, 0.0, now);
        assert!(edge.w >= MIN_WEIGHT);
    }

    #[test]
    fn decay_past_the_cliff_deletes_the_edge() {
        let now = chrono::Utc::now();
        let w = 0.015_f64;
        let days_stale = 40.0_f64;
        let w_new = w * (-LAMBDA_TIME * days_stale).exp();
        assert!(w_new < crate::domain::STALE_EDGE_MIN_WEIGHT);
        assert!(days_stale > crate::domain::STALE_EDGE_MAX_AGE_DAYS);
        let _ = now;
    }
}
