//! Cosine similarity and top-K ranking.

use std::cmp::Ordering;

use tracing::warn;

use parley_core::types::{SearchHit, StoredEmbedding};

/// Cosine similarity of two equal-length vectors, computed in `f64`.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ,
/// so the result is never NaN. Rounding can push the raw value a hair past
/// ±1, so it is clamped to `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (mag_a * mag_b);
    if similarity.is_finite() {
        similarity.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Score every candidate against `query` and keep the best `k`.
///
/// Candidates whose dimensionality differs from the query are skipped.
/// Results are ordered by score descending; equal scores put the more recent
/// meeting first, then the lower transcript id.
pub fn rank(query: &[f32], candidates: &[StoredEmbedding], k: usize) -> Vec<SearchHit> {
    let mut scored: Vec<(usize, f64)> = Vec::with_capacity(candidates.len());
    for (idx, candidate) in candidates.iter().enumerate() {
        if candidate.vector.len() != query.len() {
            warn!(
                transcript = candidate.summary.id,
                expected = query.len(),
                actual = candidate.vector.len(),
                "Skipping embedding with mismatched dimensions"
            );
            continue;
        }
        scored.push((idx, cosine_similarity(query, &candidate.vector)));
    }

    scored.sort_by(|(ia, sa), (ib, sb)| {
        let a = &candidates[*ia].summary;
        let b = &candidates[*ib].summary;
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.occurred_at.cmp(&a.occurred_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(idx, score)| SearchHit {
            transcript: candidates[idx].summary.clone(),
            similarity_score: score,
        })
        .collect()
}
