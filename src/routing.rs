//! The Routing Engine (component B): a pure function over neighbor records.
//! No I/O, no locks — this module must stay trivially testable against
//! literal vectors.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{cosine_similarity, AgentId};
use crate::error::{CoreError, CoreResult};

/// Below-threshold candidates are set aside into the exploration pool
/// instead of competing for top-K.
pub const SCORE_THRESHOLD: f64 = 0.15;
pub const DEFAULT_TOP_K: usize = 3;
pub const MMR_LAMBDA: f64 = 0.5;
pub const EPSILON_EXPLORE: f64 = 0.1;
pub const CAPABILITY_BOOST_PER_MATCH: f64 = 0.05;
pub const CAPABILITY_BOOST_CAP: usize = 4;
pub const FUZZY_MATCH_THRESHOLD: f64 = 0.7;

/// A candidate destination as seen by the routing engine: everything it
/// needs, nothing it has to fetch itself.
#[derive(Clone, Debug)]
pub struct Neighbor {
    pub agent_id: AgentId,
    pub profile_embedding: Vec<f32>,
    pub edge_weight: f64,
    pub recent_tasks: Vec<String>,
    pub capabilities: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingPick {
    pub agent_id: AgentId,
    pub score: f64,
}

/// Final routing selection: the diversified top-K, plus whether the last
/// pick came from exploration (for observability, not logic).
#[derive(Clone, Debug, Default)]
pub struct RoutingSelection {
    pub picks: Vec<RoutingPick>,
    pub explored: bool,
}

fn validate_dim(v: &[f32], what: &str) -> CoreResult<()> {
    if v.len() != crate::domain::EMBEDDING_DIM {
        return Err(CoreError::Validation(format!(
            "{what} must be {}-dimensional, got {}",
            crate::domain::EMBEDDING_DIM,
            v.len()
        )));
    }
    Ok(())
}

/// Ratcliff/Obershelp similarity ratio: `2 * matching_chars / (len(a) + len(b))`,
/// where matching characters come from the longest common substring,
/// recursively applied to the unmatched left/right remainders.
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let matches = matching_chars(&a, &b);
    (2.0 * matches as f64) / (a.len() + b.len()) as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, len) = longest_common_substring(a, b);
    if len == 0 {
        return 0;
    }
    matching_chars(&a[..start_a], &b[..start_b])
        + len
        + matching_chars(&a[start_a + len..], &b[start_b + len..])
}

fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    if a.is_empty() || b.is_empty() {
        return (0, 0, 0);
    }
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    let (mut best_len, mut best_a, mut best_b) = (0, 0, 0);

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                dp[i][j] = dp[i - 1][j - 1] + 1;
                if dp[i][j] > best_len {
                    best_len = dp[i][j];
                    best_a = i - best_len;
                    best_b = j - best_len;
                }
            }
        }
    }
    (best_a, best_b, best_len)
}

/// Fraction of `hints` matching (exactly or fuzzily) any of `tasks`.
/// Empty either side maps to 0.
fn demand_overlap(hints: &[String], tasks: &[String]) -> f64 {
    if hints.is_empty() || tasks.is_empty() {
        return 0.0;
    }
    let matched = hints
        .iter()
        .filter(|hint| {
            tasks
                .iter()
                .any(|task| hint.eq_ignore_ascii_case(task) || fuzzy_ratio(hint, task) >= FUZZY_MATCH_THRESHOLD)
        })
        .count();
    matched as f64 / hints.len() as f64
}

fn capability_boost(hints: &[String], capabilities: &[String]) -> f64 {
    let matches = hints.iter().filter(|h| capabilities.contains(h)).count();
    CAPABILITY_BOOST_PER_MATCH * matches.min(CAPABILITY_BOOST_CAP) as f64
}

/// Score one neighbor: `clamp(s * w * (0.5 + 0.5*d) + c, 0, 2)`.
pub fn score_neighbor(nutrient_embedding: &[f32], tool_hints: &[String], neighbor: &Neighbor) -> f64 {
    let s = cosine_similarity(nutrient_embedding, &neighbor.profile_embedding) as f64;
    let d = demand_overlap(tool_hints, &neighbor.recent_tasks);
    let c = capability_boost(tool_hints, &neighbor.capabilities);
    (s * neighbor.edge_weight * (0.5 + 0.5 * d) + c).clamp(0.0, 2.0)
}

/// Precompute the pairwise cosine-similarity matrix once, for MMR's inner
/// loop to index into instead of recomputing.
fn pairwise_similarity_matrix(embeddings: &[&[f32]]) -> Vec<Vec<f64>> {
    let n = embeddings.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let sim = cosine_similarity(embeddings[i], embeddings[j]) as f64;
            matrix[i][j] = sim;
            matrix[j][i] = sim;
        }
    }
    matrix
}

/// Maximum Marginal Relevance selection over `(index, score)` candidates,
/// already sorted by descending score. Returns indices into `candidates`.
fn mmr_select(scored: &[(usize, f64)], embeddings: &[&[f32]], k: usize, lambda: f64) -> Vec<usize> {
    if k >= scored.len() {
        return scored.iter().map(|(i, _)| *i).collect();
    }

    let sim = pairwise_similarity_matrix(embeddings);
    let mut selected = vec![scored[0].0];
    let mut remaining: Vec<usize> = scored[1..].iter().map(|(i, _)| *i).collect();
    let score_of: std::collections::HashMap<usize, f64> = scored.iter().cloned().collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (pos, &candidate) in remaining.iter().enumerate() {
            let relevance = score_of[&candidate];
            let max_sim_to_selected = selected
                .iter()
                .map(|&s| sim[candidate][s])
                .fold(f64::NEG_INFINITY, f64::max);
            let value = lambda * relevance - (1.0 - lambda) * max_sim_to_selected;
            if value > best_value {
                best_value = value;
                best_idx = pos;
            }
        }
        selected.push(remaining.remove(best_idx));
    }

    selected
}

/// Select up to `top_k` diversified neighbors for a nutrient, with
/// ε-greedy exploration. Never raises except on dimension mismatch;
/// an empty neighbor list yields an empty selection.
pub fn route(
    nutrient_embedding: &[f32],
    tool_hints: &[String],
    neighbors: &[Neighbor],
    top_k: usize,
    diversify: bool,
) -> CoreResult<RoutingSelection> {
    validate_dim(nutrient_embedding, "nutrient embedding")?;
    for n in neighbors {
        validate_dim(&n.profile_embedding, "neighbor profile embedding")?;
    }

    if neighbors.is_empty() || top_k == 0 {
        return Ok(RoutingSelection::default());
    }

    let mut scored: Vec<(usize, f64)> = neighbors
        .iter()
        .enumerate()
        .map(|(i, n)| (i, score_neighbor(nutrient_embedding, tool_hints, n)))
        .collect();

    let exploration_pool: Vec<usize> = scored
        .iter()
        .filter(|(_, score)| *score < SCORE_THRESHOLD)
        .map(|(i, _)| *i)
        .collect();

    scored.retain(|(_, score)| *score >= SCORE_THRESHOLD);
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    if scored.is_empty() {
        return Ok(RoutingSelection::default());
    }

    let k = top_k.min(scored.len());
    let chosen_indices = if diversify && scored.len() > k {
        let embeddings: Vec<&[f32]> = neighbors.iter().map(|n| n.profile_embedding.as_slice()).collect();
        mmr_select(&scored, &embeddings, k, MMR_LAMBDA)
    } else {
        scored.iter().take(k).map(|(i, _)| *i).collect()
    };

    let score_of: std::collections::HashMap<usize, f64> = scored.iter().cloned().collect();
    let mut picks: Vec<RoutingPick> = chosen_indices
        .into_iter()
        .map(|i| RoutingPick { agent_id: neighbors[i].agent_id.clone(), score: score_of[&i] })
        .collect();

    let mut explored = false;
    if !picks.is_empty() && !exploration_pool.is_empty() && rand::thread_rng().gen_bool(EPSILON_EXPLORE) {
        let explore_idx = exploration_pool[rand::thread_rng().gen_range(0..exploration_pool.len())];
        let lowest_pos = picks
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(pos, _)| pos)
            .unwrap();
        picks[lowest_pos] = RoutingPick {
            agent_id: neighbors[explore_idx].agent_id.clone(),
            score: score_of.get(&explore_idx).copied().unwrap_or(0.0),
        };
        explored = true;
    }

    Ok(RoutingSelection { picks, explored })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EMBEDDING_DIM;

    fn unit_vec(index: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; EMBEDDING_DIM];
        v[index] = 1.0;
        v
    }

    fn neighbor(id: &str, dim: usize, w: f64) -> Neighbor {
        Neighbor {
            agent_id: id.to_string(),
            profile_embedding: unit_vec(dim),
            edge_weight: w,
            recent_tasks: vec![],
            capabilities: vec![],
        }
    }

    #[test]
    fn empty_neighbors_yields_empty_selection() {
        let v = unit_vec(0);
        let result = route(&v, &[], &[], 3, true).unwrap();
        assert!(result.picks.is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let bad = vec![0.0_f32; 10];
        let err = route(&bad, &[], &[], 3, true).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn mmr_returns_all_candidates_when_k_covers_them() {
        let v = unit_vec(0);
        let neighbors = vec![neighbor("a", 0, 1.0), neighbor("b", 1, 1.0)];
        let result = route(&v, &[], &neighbors, 10, true).unwrap();
        assert_eq!(result.picks.len(), 2);
    }

    #[test]
    fn fuzzy_ratio_matches_close_spellings() {
        assert!(fuzzy_ratio("database.optimize", "database.optimise") >= FUZZY_MATCH_THRESHOLD);
        assert!(fuzzy_ratio("db.optimize", "network.monitor") < FUZZY_MATCH_THRESHOLD);
    }

    #[test]
    fn demand_overlap_uses_fuzzy_matching() {
        let hints = vec!["database.optimize".to_string()];
        let tasks = vec!["database.optimise".to_string()];
        assert!(demand_overlap(&hints, &tasks) > 0.0);

        let hints2 = vec!["db.optimize".to_string()];
        let tasks2 = vec!["network.monitor".to_string()];
        assert_eq!(demand_overlap(&hints2, &tasks2), 0.0);
    }

    #[test]
    fn high_threshold_prunes_everything() {
        let v = unit_vec(0);
        let neighbors = vec![neighbor("a", 5, 0.01)];
        let result = route(&v, &[], &neighbors, 3, true).unwrap();
        assert!(result.picks.is_empty());
    }
}
