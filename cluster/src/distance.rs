//! Distance and nearest-centroid assignment shared by every model family.

use serde::Serialize;

use crate::error::ClusterError;

/// Result of assigning one input vector to a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterAssignment {
    /// Position of the vector in the input batch.
    pub vector_index: usize,

    /// Index of the nearest centroid.
    pub cluster_id: usize,

    /// Euclidean distance to that centroid.
    pub distance: f64,
}

/// Euclidean distance between two vectors of equal length.
///
/// Falls back to a scaled form when the squared sum overflows.
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    let sq = squared_euclidean(a, b);
    if sq.is_finite() {
        sq.sqrt()
    } else {
        scaled_euclidean(a, b)
    }
}

fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// `max|d| * sqrt(sum((d / max|d|)^2))`, immune to overflow in the squares.
fn scaled_euclidean(a: &[f64], b: &[f64]) -> f64 {
    let scale = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f64, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (x - y) / scale;
            d * d
        })
        .sum();
    scale * sum.sqrt()
}

/// Returns `(index, distance)` of the centroid closest to `v`.
///
/// Ties go to the lowest centroid index. `centroids` must be non-empty.
pub(crate) fn nearest(centroids: &[Vec<f64>], v: &[f64]) -> (usize, f64) {
    let mut best_idx = 0;
    let mut best = squared_euclidean(&centroids[0], v);
    let mut overflow = !best.is_finite();
    for (i, c) in centroids.iter().enumerate().skip(1) {
        let d = squared_euclidean(c, v);
        overflow |= !d.is_finite();
        // Strict comparison keeps the earlier centroid on ties.
        if d < best {
            best = d;
            best_idx = i;
        }
    }
    if overflow {
        return nearest_scaled(centroids, v);
    }
    (best_idx, best.sqrt())
}

fn nearest_scaled(centroids: &[Vec<f64>], v: &[f64]) -> (usize, f64) {
    let mut best_idx = 0;
    let mut best = euclidean(&centroids[0], v);
    for (i, c) in centroids.iter().enumerate().skip(1) {
        let d = euclidean(c, v);
        if d < best {
            best = d;
            best_idx = i;
        }
    }
    (best_idx, best)
}

/// Rejects the batch if any vector's length differs from `dim` or any
/// feature is NaN or infinite.
pub(crate) fn check_batch<V: AsRef<[f64]>>(batch: &[V], dim: usize) -> Result<(), ClusterError> {
    for (index, v) in batch.iter().enumerate() {
        let v = v.as_ref();
        let got = v.len();
        if got != dim {
            return Err(ClusterError::DimensionMismatch {
                index,
                expected: dim,
                got,
            });
        }
        if !v.iter().all(|x| x.is_finite()) {
            return Err(ClusterError::NonFiniteValue { index });
        }
    }
    Ok(())
}

/// Assigns every vector of an already validated batch.
pub(crate) fn assign_batch<V: AsRef<[f64]>>(
    centroids: &[Vec<f64>],
    batch: &[V],
) -> Vec<ClusterAssignment> {
    batch
        .iter()
        .enumerate()
        .map(|(vector_index, v)| {
            let (cluster_id, distance) = nearest(centroids, v.as_ref());
            ClusterAssignment {
                vector_index,
                cluster_id,
                distance,
            }
        })
        .collect()
}

/// Returns the indices of the first `n` pairwise-distinct vectors, in input
/// order.
///
/// Fails with [`ClusterError::InsufficientData`] when the batch holds fewer
/// than `n` distinct vectors.
pub(crate) fn first_distinct<V: AsRef<[f64]>>(
    batch: &[V],
    n: usize,
) -> Result<Vec<usize>, ClusterError> {
    let mut picked: Vec<usize> = Vec::with_capacity(n);
    for (i, v) in batch.iter().enumerate() {
        if picked.len() == n {
            break;
        }
        let v = v.as_ref();
        if picked.iter().all(|&j| batch[j].as_ref() != v) {
            picked.push(i);
        }
    }
    if picked.len() < n {
        return Err(ClusterError::InsufficientData {
            needed: n,
            distinct: picked.len(),
        });
    }
    Ok(picked)
}
