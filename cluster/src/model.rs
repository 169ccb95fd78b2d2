use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::distance::ClusterAssignment;
use crate::error::ClusterError;
use crate::static_model::StaticClusterer;
use crate::streaming::StreamingClusterer;

/// Model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Trained offline, served read-only.
    Static,
    /// Updated incrementally via `partial_fit`.
    Streaming,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Static => "static",
            Method::Streaming => "streaming",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(Method::Static),
            "streaming" => Ok(Method::Streaming),
            other => Err(format!("unknown method {other:?} (want static or streaming)")),
        }
    }
}

/// A clustering model of either family.
///
/// Prediction is available on both variants; only [`Model::Streaming`]
/// can be updated.
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    Static(StaticClusterer),
    Streaming(StreamingClusterer),
}

impl Model {
    pub fn method(&self) -> Method {
        match self {
            Model::Static(_) => Method::Static,
            Model::Streaming(_) => Method::Streaming,
        }
    }

    pub fn centroids(&self) -> &[Vec<f64>] {
        match self {
            Model::Static(m) => m.centroids(),
            Model::Streaming(m) => m.centroids(),
        }
    }

    pub fn feature_dim(&self) -> usize {
        match self {
            Model::Static(m) => m.feature_dim(),
            Model::Streaming(m) => m.feature_dim(),
        }
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids().len()
    }

    /// Per-cluster sample counts. `None` for static models.
    pub fn sample_counts(&self) -> Option<&[u64]> {
        match self {
            Model::Static(_) => None,
            Model::Streaming(m) => Some(m.sample_counts()),
        }
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        match self {
            Model::Static(m) => m.last_updated(),
            Model::Streaming(m) => m.last_updated(),
        }
    }

    /// Assigns each vector to its nearest centroid.
    pub fn predict<V: AsRef<[f64]>>(
        &self,
        batch: &[V],
    ) -> Result<Vec<ClusterAssignment>, ClusterError> {
        match self {
            Model::Static(m) => m.predict(batch),
            Model::Streaming(m) => m.predict(batch),
        }
    }

    pub fn metadata(&self) -> ModelMetadata {
        let sample_counts = self.sample_counts().map(<[u64]>::to_vec);
        ModelMetadata {
            method: self.method(),
            n_clusters: self.n_clusters(),
            feature_dim: self.feature_dim(),
            total_samples: sample_counts.as_ref().map(|c| c.iter().sum()),
            sample_counts,
            last_updated: self.last_updated(),
        }
    }
}

/// Read-only description of a model, as reported by `model_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub method: Method,
    pub n_clusters: usize,
    pub feature_dim: usize,

    /// Sum of all per-cluster counts (streaming only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_samples: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_counts: Option<Vec<u64>>,

    pub last_updated: DateTime<Utc>,
}

/// Validates a centroid set and returns its feature dimension.
pub(crate) fn validate_centroids(centroids: &[Vec<f64>]) -> Result<usize, ClusterError> {
    let Some(first) = centroids.first() else {
        return Err(ClusterError::InvalidConfig(
            "model needs at least one centroid".into(),
        ));
    };
    let dim = first.len();
    if dim == 0 {
        return Err(ClusterError::InvalidConfig(
            "centroids must have at least one feature".into(),
        ));
    }
    crate::distance::check_batch(centroids, dim)?;
    Ok(dim)
}
