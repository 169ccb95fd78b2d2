use chrono::{DateTime, Utc};

use crate::distance::{assign_batch, check_batch, ClusterAssignment};
use crate::error::ClusterError;
use crate::model::validate_centroids;

/// Pre-trained, immutable set of centroids.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticClusterer {
    centroids: Vec<Vec<f64>>,
    feature_dim: usize,
    last_updated: DateTime<Utc>,
}

impl StaticClusterer {
    /// Creates a static model stamped with the current time.
    pub fn new(centroids: Vec<Vec<f64>>) -> Result<Self, ClusterError> {
        Self::with_timestamp(centroids, Utc::now())
    }

    pub fn with_timestamp(
        centroids: Vec<Vec<f64>>,
        last_updated: DateTime<Utc>,
    ) -> Result<Self, ClusterError> {
        let feature_dim = validate_centroids(&centroids)?;
        Ok(Self {
            centroids,
            feature_dim,
            last_updated,
        })
    }

    pub fn centroids(&self) -> &[Vec<f64>] {
        &self.centroids
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Assigns each vector to its nearest centroid, lowest index on ties.
    ///
    /// The whole batch is rejected if any vector has the wrong length or a
    /// non-finite feature.
    pub fn predict<V: AsRef<[f64]>>(
        &self,
        batch: &[V],
    ) -> Result<Vec<ClusterAssignment>, ClusterError> {
        check_batch(batch, self.feature_dim)?;
        Ok(assign_batch(&self.centroids, batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_tie_lowest_index() {
        let m = StaticClusterer::new(vec![vec![0.0, 0.0], vec![0.0, 0.0]]).unwrap();
        let out = m.predict(&[[0.0, 0.0]]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].cluster_id, 0);
        assert_eq!(out[0].distance, 0.0);
    }

    #[test]
    fn predict_is_deterministic() {
        let m = StaticClusterer::new(vec![
            vec![0.0, 0.0, 0.0],
            vec![5.0, 5.0, 5.0],
            vec![-3.0, 2.0, 7.5],
        ])
        .unwrap();
        let batch = vec![
            vec![0.1, -0.2, 0.3],
            vec![4.0, 6.0, 5.5],
            vec![-2.0, 2.0, 7.0],
            vec![2.5, 2.5, 2.5],
        ];
        let first = m.predict(&batch).unwrap();
        for _ in 0..10 {
            assert_eq!(m.predict(&batch).unwrap(), first);
        }
        let ids: Vec<usize> = first.iter().map(|a| a.cluster_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 0]);
    }

    #[test]
    fn predict_rejects_whole_batch_on_bad_dimension() {
        let m = StaticClusterer::new(vec![vec![0.0, 0.0]]).unwrap();
        let batch = vec![vec![1.0, 1.0], vec![1.0, 1.0, 1.0]];
        match m.predict(&batch) {
            Err(ClusterError::DimensionMismatch {
                index,
                expected,
                got,
            }) => assert_eq!((index, expected, got), (1, 2, 3)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn predict_huge_but_finite_coordinates() {
        let m = StaticClusterer::new(vec![vec![0.0], vec![1e300]]).unwrap();
        let out = m.predict(&[[9e299]]).unwrap();
        assert_eq!(out[0].cluster_id, 1);
        assert!(out[0].distance.is_finite());
    }

    #[test]
    fn new_rejects_non_finite_centroids() {
        assert!(matches!(
            StaticClusterer::new(vec![vec![f64::NAN], vec![5.0]]),
            Err(ClusterError::NonFiniteValue { index: 0 })
        ));
    }

    #[test]
    fn predict_empty_batch() {
        let m = StaticClusterer::new(vec![vec![0.0]]).unwrap();
        let batch: Vec<Vec<f64>> = Vec::new();
        assert!(m.predict(&batch).unwrap().is_empty());
    }

    #[test]
    fn new_rejects_empty() {
        assert!(StaticClusterer::new(Vec::new()).is_err());
    }
}
