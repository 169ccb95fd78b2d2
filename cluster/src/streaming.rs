use chrono::{DateTime, Utc};
use tracing::debug;

use crate::distance::{assign_batch, check_batch, first_distinct, nearest, ClusterAssignment};
use crate::error::ClusterError;
use crate::model::validate_centroids;

/// Online nearest-centroid model updated one vector at a time.
///
/// Each centroid is the running arithmetic mean of every vector ever
/// assigned to it. Because assignment depends on the current centroids,
/// the final state depends on the order in which vectors arrive: feeding
/// the same vectors in a different order can produce different centroids.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingClusterer {
    centroids: Vec<Vec<f64>>,
    sample_counts: Vec<u64>,
    feature_dim: usize,
    last_updated: DateTime<Utc>,
}

impl StreamingClusterer {
    /// Creates a streaming model from explicit centroids and counts.
    pub fn new(centroids: Vec<Vec<f64>>, sample_counts: Vec<u64>) -> Result<Self, ClusterError> {
        Self::with_timestamp(centroids, sample_counts, Utc::now())
    }

    pub fn with_timestamp(
        centroids: Vec<Vec<f64>>,
        sample_counts: Vec<u64>,
        last_updated: DateTime<Utc>,
    ) -> Result<Self, ClusterError> {
        let feature_dim = validate_centroids(&centroids)?;
        if sample_counts.len() != centroids.len() {
            return Err(ClusterError::InvalidConfig(format!(
                "{} sample counts for {} centroids",
                sample_counts.len(),
                centroids.len()
            )));
        }
        Ok(Self {
            centroids,
            sample_counts,
            feature_dim,
            last_updated,
        })
    }

    /// Initializes a model from the first batch it ever sees.
    ///
    /// The first `n_clusters` distinct vectors (in input order) become the
    /// centroids with a count of one each. Every other vector in the batch
    /// is then folded in with [`partial_fit`](Self::partial_fit) semantics.
    pub fn cold_start<V: AsRef<[f64]>>(n_clusters: usize, batch: &[V]) -> Result<Self, ClusterError> {
        if n_clusters == 0 {
            return Err(ClusterError::InvalidConfig("n_clusters must be positive".into()));
        }
        let Some(first) = batch.first() else {
            return Err(ClusterError::InsufficientData {
                needed: n_clusters,
                distinct: 0,
            });
        };
        let feature_dim = first.as_ref().len();
        if feature_dim == 0 {
            return Err(ClusterError::InsufficientData {
                needed: n_clusters,
                distinct: 0,
            });
        }
        check_batch(batch, feature_dim)?;

        let seeds = first_distinct(batch, n_clusters)?;
        let centroids: Vec<Vec<f64>> = seeds.iter().map(|&i| batch[i].as_ref().to_vec()).collect();
        let mut model = Self {
            centroids,
            sample_counts: vec![1; n_clusters],
            feature_dim,
            last_updated: Utc::now(),
        };

        for (i, v) in batch.iter().enumerate() {
            if !seeds.contains(&i) {
                model.update(v.as_ref());
            }
        }
        debug!(
            n_clusters,
            feature_dim,
            batch = batch.len(),
            "streaming model initialized from first batch"
        );
        Ok(model)
    }

    pub fn centroids(&self) -> &[Vec<f64>] {
        &self.centroids
    }

    pub fn sample_counts(&self) -> &[u64] {
        &self.sample_counts
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    pub fn total_samples(&self) -> u64 {
        self.sample_counts.iter().sum()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Same contract as [`StaticClusterer::predict`](crate::StaticClusterer::predict).
    pub fn predict<V: AsRef<[f64]>>(
        &self,
        batch: &[V],
    ) -> Result<Vec<ClusterAssignment>, ClusterError> {
        check_batch(batch, self.feature_dim)?;
        Ok(assign_batch(&self.centroids, batch))
    }

    /// Folds a batch into the model, one vector at a time in input order.
    ///
    /// The batch is validated up front: on `DimensionMismatch` or
    /// `NonFiniteValue` no centroid is touched.
    pub fn partial_fit<V: AsRef<[f64]>>(&mut self, batch: &[V]) -> Result<(), ClusterError> {
        check_batch(batch, self.feature_dim)?;
        if batch.is_empty() {
            return Ok(());
        }
        for v in batch {
            self.update(v.as_ref());
        }
        self.last_updated = Utc::now();
        debug!(batch = batch.len(), total = self.total_samples(), "partial_fit applied");
        Ok(())
    }

    /// Assigns `v` and moves the winning centroid to the new running mean.
    fn update(&mut self, v: &[f64]) {
        let (idx, _) = nearest(&self.centroids, v);
        self.sample_counts[idx] += 1;
        let n = self.sample_counts[idx] as f64;
        for (c, x) in self.centroids[idx].iter_mut().zip(v) {
            *c += (x - *c) / n;
        }
    }
}
