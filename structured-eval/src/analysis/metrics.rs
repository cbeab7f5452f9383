//! Accuracy statistics

use std::hash::Hash;

use indexmap::IndexMap;

/// z for a two-sided 95% interval
pub const Z_95: f64 = 1.96;

/// Fraction of positions where `preds` equals `golds`.
///
/// Returns `None` when the slices differ in length, `Some(0.0)` when both are
/// empty.
pub fn accuracy<T: PartialEq>(preds: &[T], golds: &[T]) -> Option<f64> {
    if preds.len() != golds.len() {
        return None;
    }
    if preds.is_empty() {
        return Some(0.0);
    }
    let correct = preds.iter().zip(golds).filter(|(p, g)| p == g).count();
    Some(correct as f64 / preds.len() as f64)
}

/// Wilson score interval for a proportion `p_hat` observed over `n` trials,
/// clamped to `[0, 1]`. `(0, 0)` when `n` is 0.
pub fn wilson_ci(p_hat: f64, n: usize, z: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }
    let n = n as f64;
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = (p_hat + z2 / (2.0 * n)) / denom;
    let margin = z * ((p_hat * (1.0 - p_hat) + z2 / (4.0 * n)) / n).sqrt() / denom;
    ((center - margin).max(0.0), (center + margin).min(1.0))
}

/// Most frequent value; ties go to the value seen first
pub fn majority_vote<T: Eq + Hash + Clone>(values: &[T]) -> Option<T> {
    let mut counts: IndexMap<&T, usize> = IndexMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut best: Option<(&T, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.clone())
}
