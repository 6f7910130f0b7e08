//! The 1536-dimensional unit-norm embedding type shared by nutrients, agent
//! profiles, and hyphal memories.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Fixed dimensionality for every embedding in the system.
///
/// Embeddings arrive pre-computed from callers; the core never runs an
/// embedding model itself.
pub const EMBEDDING_DIM: usize = 1536;

/// A validated 1536-dim embedding vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Validate and wrap a raw vector, rejecting anything not exactly
    /// [`EMBEDDING_DIM`] long.
    pub fn new(values: Vec<f32>) -> CoreResult<Self> {
        if values.len() != EMBEDDING_DIM {
            return Err(CoreError::Validation(format!(
                "embedding must be {EMBEDDING_DIM}-dimensional, got {}",
                values.len()
            )));
        }
        Ok(Embedding(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

/// Cosine similarity remapped from `[-1, 1]` to `[0, 1]`.
///
/// Zero-norm vectors (either side) map to 0, not NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += *x as f64 * *y as f64;
        norm_a += *x as f64 * *x as f64;
        norm_b += *y as f64 * *y as f64;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    let raw = (dot / denom).clamp(-1.0, 1.0);
    (((raw + 1.0) / 2.0) as f32).clamp(0.0, 1.0)
}

/// Remap a raw `[-1, 1]` cosine score from an external ANN backend into this
/// system's `[0, 1]` convention, the same way [`cosine_similarity`] does for
/// vectors computed in-process. Keeps hyphal-memory search scores and
/// routing scores on one comparable scale.
pub fn remap_cosine_score(raw: f32) -> f64 {
    ((raw.clamp(-1.0, 1.0) as f64 + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(Embedding::new(vec![0.0; 10]).is_err());
        assert!(Embedding::new(vec![0.0; EMBEDDING_DIM]).is_ok());
    }

    #[test]
    fn self_similarity_is_near_one() {
        let mut v = vec![0.0_f32; EMBEDDING_DIM];
        v[0] = 1.0;
        let s = cosine_similarity(&v, &v);
        assert!((0.99..=1.0).contains(&s), "got {s}");
    }

    #[test]
    fn opposite_vectors_map_near_zero() {
        let mut a = vec![0.0_f32; EMBEDDING_DIM];
        a[0] = 1.0;
        let mut b = vec![0.0_f32; EMBEDDING_DIM];
        b[0] = -1.0;
        let s = cosine_similarity(&a, &b);
        assert!((0.0..=0.01).contains(&s), "got {s}");
    }

    #[test]
    fn orthogonal_vectors_map_near_half() {
        let mut a = vec![0.0_f32; EMBEDDING_DIM];
        a[0] = 1.0;
        let mut b = vec![0.0_f32; EMBEDDING_DIM];
        b[1] = 1.0;
        let s = cosine_similarity(&a, &b);
        assert!((s - 0.5).abs() < 1e-6, "got {s}");
    }

    #[test]
    fn zero_vector_maps_to_zero() {
        let a = vec![0.0_f32; EMBEDDING_DIM];
        let mut b = vec![0.0_f32; EMBEDDING_DIM];
        b[0] = 1.0;
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
