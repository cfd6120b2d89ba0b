use std::cmp::Ordering;

use crate::error::{RecommenderError, Result};

/// Tolerance for weight-tuple validation.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Checks that a weight tuple is non-negative and sums to 1 within tolerance.
pub fn validate_weights(weights: &[f64]) -> Result<()> {
    if weights.iter().any(|w| *w < 0.0) {
        return Err(RecommenderError::InvalidWeights(
            "weights must be non-negative".to_string(),
        ));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_EPSILON {
        return Err(RecommenderError::InvalidWeights(format!(
            "weights must sum to 1.0, got {}",
            sum
        )));
    }
    Ok(())
}

/// Weighted sum of vectors divided by the number of pairs.
///
/// The denominator is the pair count, not the weight sum. Rankings produced
/// downstream depend on this exact normalization.
pub fn scaled_avg(pairs: &[(f64, Vec<f32>)]) -> Result<Vec<f32>> {
    let first = pairs.first().ok_or_else(|| {
        RecommenderError::InvalidParam("scaled_avg requires at least one pair".to_string())
    })?;
    let dim = first.1.len();
    let mut acc = vec![0.0f64; dim];
    for (weight, vector) in pairs {
        if vector.len() != dim {
            return Err(RecommenderError::ShapeMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        for (slot, value) in acc.iter_mut().zip(vector.iter()) {
            *slot += weight * (*value as f64);
        }
    }
    let n = pairs.len() as f64;
    Ok(acc.into_iter().map(|v| (v / n) as f32).collect())
}

/// Cosine similarity; 0 when either vector has an undefined norm or the
/// dimensions disagree.
pub fn cosine(u: &[f32], v: &[f32]) -> f64 {
    if u.len() != v.len() || u.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_u = 0.0f64;
    let mut norm_v = 0.0f64;
    for (a, b) in u.iter().zip(v.iter()) {
        dot += (*a as f64) * (*b as f64);
        norm_u += (*a as f64) * (*a as f64);
        norm_v += (*b as f64) * (*b as f64);
    }
    if norm_u == 0.0 || norm_v == 0.0 {
        return 0.0;
    }
    dot / (norm_u.sqrt() * norm_v.sqrt())
}

/// Indices of the top `k` scores, descending, ties broken by ascending index.
pub fn argsort_topk(scores: &[f64], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    indices.truncate(k);
    indices
}

/// Shared ranker: order (score desc, id asc) and trim to `limit`.
pub fn rank_ids(mut scored: Vec<(String, f64)>, limit: usize) -> Vec<String> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);
    scored.into_iter().map(|(id, _)| id).collect()
}
