//! Score fusion: min-max normalisation and weighted combination.

/// Spreads below this are treated as zero variance.
const MIN_SPREAD: f64 = 1e-9;

/// Min-max normalises scores to `[0, 1]`.
///
/// A constant (zero-variance) input maps to all zeros.
pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    let (min, max) = scores
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        });
    let spread = max - min;
    if scores.is_empty() || !spread.is_finite() || spread < MIN_SPREAD {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|&s| (s - min) / spread).collect()
}

/// Combines per-candidate scores and returns candidate positions, best first.
///
/// Without `vector_scores` candidates are ranked by `lexical_scores` alone.
/// Otherwise both are normalised independently and combined as
/// `(1 - alpha) * vector + alpha * lexical`. Ties keep input order.
///
/// `vector_scores` (when present) and `lexical_scores` must have the same
/// length; missing entries count as 0.
pub fn fuse(vector_scores: Option<&[f64]>, lexical_scores: &[f64], alpha: f64) -> Vec<usize> {
    let combined: Vec<f64> = match vector_scores {
        None => lexical_scores.to_vec(),
        Some(vector_scores) => {
            let v = min_max_normalize(vector_scores);
            let l = min_max_normalize(lexical_scores);
            (0..lexical_scores.len())
                .map(|i| (1.0 - alpha) * v.get(i).copied().unwrap_or(0.0) + alpha * l[i])
                .collect()
        }
    };

    let mut order: Vec<usize> = (0..combined.len()).collect();
    // sort_by is stable
    order.sort_by(|&a, &b| combined[b].total_cmp(&combined[a]));
    order
}
