//! Offline batch k-means (Lloyd's algorithm) for producing served models.

use tracing::debug;

use crate::distance::{check_batch, first_distinct, nearest};
use crate::error::ClusterError;
use crate::model::{Method, Model};
use crate::static_model::StaticClusterer;
use crate::streaming::StreamingClusterer;

/// Options for [`fit`].
#[derive(Debug, Clone)]
pub struct KMeansOptions {
    /// Number of clusters.
    pub n_clusters: usize,
    /// Maximum Lloyd iterations.
    pub max_iter: usize,
    /// Stop once no centroid moves farther than this.
    pub tol: f64,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            n_clusters: 8,
            max_iter: 100,
            tol: 1e-6,
        }
    }
}

/// Outcome of a k-means run.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub centroids: Vec<Vec<f64>>,
    /// Number of training vectors assigned to each centroid.
    pub counts: Vec<u64>,
    pub iterations: usize,
    /// Sum of squared distances from each vector to its centroid.
    pub inertia: f64,
}

impl KMeansFit {
    /// Wraps the fitted centroids as a servable model.
    ///
    /// A streaming model starts from the training counts, so later
    /// `partial_fit` calls keep extending the same running means.
    pub fn into_model(self, method: Method) -> Result<Model, ClusterError> {
        match method {
            Method::Static => StaticClusterer::new(self.centroids).map(Model::Static),
            Method::Streaming => {
                StreamingClusterer::new(self.centroids, self.counts).map(Model::Streaming)
            }
        }
    }
}

/// Clusters `data` into `opts.n_clusters` groups.
///
/// Initialization is deterministic: the first `n_clusters` distinct vectors
/// are the starting centroids. A cluster that loses all its members keeps
/// its previous centroid.
pub fn fit<V: AsRef<[f64]>>(data: &[V], opts: &KMeansOptions) -> Result<KMeansFit, ClusterError> {
    if opts.n_clusters == 0 {
        return Err(ClusterError::InvalidConfig("n_clusters must be positive".into()));
    }
    if opts.max_iter == 0 {
        return Err(ClusterError::InvalidConfig("max_iter must be positive".into()));
    }
    let dim = data.first().map(|v| v.as_ref().len()).unwrap_or(0);
    if dim == 0 {
        return Err(ClusterError::InsufficientData {
            needed: opts.n_clusters,
            distinct: 0,
        });
    }
    check_batch(data, dim)?;

    let mut centroids: Vec<Vec<f64>> = first_distinct(data, opts.n_clusters)?
        .into_iter()
        .map(|i| data[i].as_ref().to_vec())
        .collect();
    let k = centroids.len();
    let mut labels = vec![0usize; data.len()];
    let mut iterations = 0;

    while iterations < opts.max_iter {
        iterations += 1;

        for (label, v) in labels.iter_mut().zip(data) {
            *label = nearest(&centroids, v.as_ref()).0;
        }

        let mut sums = vec![vec![0.0f64; dim]; k];
        let mut counts = vec![0u64; k];
        for (&label, v) in labels.iter().zip(data) {
            counts[label] += 1;
            for (s, x) in sums[label].iter_mut().zip(v.as_ref()) {
                *s += x;
            }
        }

        let mut max_shift: f64 = 0.0;
        for (c, (sum, &count)) in centroids.iter_mut().zip(sums.iter().zip(&counts)) {
            if count == 0 {
                continue;
            }
            let mean: Vec<f64> = sum.iter().map(|s| s / count as f64).collect();
            max_shift = max_shift.max(crate::distance::euclidean(c.as_slice(), &mean));
            *c = mean;
        }

        if max_shift <= opts.tol {
            break;
        }
    }

    // Final assignment against the converged centroids.
    let mut counts = vec![0u64; k];
    let mut inertia = 0.0;
    for v in data {
        let (idx, dist) = nearest(&centroids, v.as_ref());
        counts[idx] += 1;
        inertia += dist * dist;
    }

    debug!(k, iterations, inertia, "k-means finished");
    Ok(KMeansFit {
        centroids,
        counts,
        iterations,
        inertia,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![10.0, 10.0],
            vec![0.5, -0.5],
            vec![9.5, 10.5],
            vec![-0.5, 0.5],
            vec![10.5, 9.5],
        ]
    }

    #[test]
    fn fit_two_blobs() {
        let fit = fit(
            &two_blobs(),
            &KMeansOptions {
                n_clusters: 2,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(fit.counts, vec![3, 3]);
        assert!(fit.centroids[0].iter().all(|x| x.abs() < 1e-12));
        assert!(fit.centroids[1].iter().all(|x| (x - 10.0).abs() < 1e-12));
        assert!((fit.inertia - 2.0).abs() < 1e-9);
        assert!(fit.iterations <= 3);
    }

    #[test]
    fn fit_is_deterministic() {
        let opts = KMeansOptions {
            n_clusters: 2,
            ..Default::default()
        };
        let a = fit(&two_blobs(), &opts).unwrap();
        let b = fit(&two_blobs(), &opts).unwrap();
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.counts, b.counts);
    }

    #[test]
    fn fit_errors() {
        let opts = KMeansOptions {
            n_clusters: 3,
            ..Default::default()
        };
        assert!(matches!(
            fit(&[[1.0], [1.0]], &opts),
            Err(ClusterError::InsufficientData { needed: 3, distinct: 1 })
        ));
        assert!(matches!(
            fit(&[vec![1.0], vec![1.0, 2.0]], &opts),
            Err(ClusterError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            fit(
                &[[1.0]],
                &KMeansOptions {
                    n_clusters: 0,
                    ..Default::default()
                }
            ),
            Err(ClusterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn into_streaming_model_keeps_counts() {
        let fit = fit(
            &two_blobs(),
            &KMeansOptions {
                n_clusters: 2,
                ..Default::default()
            },
        )
        .unwrap();
        let model = fit.into_model(Method::Streaming).unwrap();
        assert_eq!(model.sample_counts(), Some(&[3u64, 3][..]));
    }
}
