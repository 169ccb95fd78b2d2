use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::distance::ClusterAssignment;
use crate::error::ClusterError;
use crate::model::{Method, Model, ModelMetadata};
use crate::persist;
use crate::streaming::StreamingClusterer;

/// Controls registry behavior.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cluster count used when a streaming model is created from the first
    /// `partial_fit` batch. Default: 3.
    pub n_clusters: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { n_clusters: 3 }
    }
}

type ActiveModel = Arc<RwLock<Model>>;

/// Owns the single active model and arbitrates concurrent access to it.
///
/// Thread-safe: all methods can be called concurrently.
///
/// - `predict` holds a shared lock on the model for the whole batch.
/// - `partial_fit` holds the model's exclusive lock for the whole batch.
/// - `load_model` reads the file with no lock held and only takes the slot
///   lock to swap the reference. Calls already holding the previous model
///   finish against it.
///
/// Concurrent `partial_fit` calls are applied in lock acquisition order;
/// callers that need a specific order must serialize their own calls.
pub struct ModelRegistry {
    slot: RwLock<Option<ActiveModel>>,
    n_clusters: usize,
}

impl ModelRegistry {
    /// Creates an empty registry. Fails if `cfg.n_clusters` is 0.
    pub fn new(cfg: Config) -> Result<Self, ClusterError> {
        if cfg.n_clusters == 0 {
            return Err(ClusterError::InvalidConfig(
                "n_clusters must be positive".into(),
            ));
        }
        Ok(Self {
            slot: RwLock::new(None),
            n_clusters: cfg.n_clusters,
        })
    }

    /// Cluster count used for cold-start streaming models.
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Returns true if a model is installed.
    pub fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }

    fn current(&self) -> Option<ActiveModel> {
        self.slot.read().as_ref().map(Arc::clone)
    }

    /// Reads the model at `path` and makes it the active model.
    ///
    /// The persisted method must equal `method`; otherwise
    /// [`ClusterError::MethodMismatch`] is returned and the registry keeps
    /// its current model.
    pub fn load_model(&self, path: &Path, method: Method) -> Result<ModelMetadata, ClusterError> {
        let model = match persist::load_file(path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "load_model rejected");
                return Err(e);
            }
        };
        if model.method() != method {
            warn!(
                path = %path.display(),
                requested = %method,
                persisted = %model.method(),
                "load_model method mismatch"
            );
            return Err(ClusterError::MethodMismatch {
                expected: method,
                found: model.method(),
            });
        }
        let meta = self.install(model);
        info!(path = %path.display(), method = %meta.method, n_clusters = meta.n_clusters, "model loaded");
        Ok(meta)
    }

    /// Replaces the active model with `model`.
    pub fn install(&self, model: Model) -> ModelMetadata {
        let meta = model.metadata();
        let fresh = Arc::new(RwLock::new(model));
        let previous = self.slot.write().replace(fresh);
        // Dropped outside the slot lock; readers may still hold it.
        drop(previous);
        meta
    }

    /// Returns a description of the active model.
    pub fn model_info(&self) -> Result<ModelMetadata, ClusterError> {
        let active = self.current().ok_or(ClusterError::NotLoaded)?;
        let model = active.read();
        Ok(model.metadata())
    }

    /// Assigns each vector of `batch` to a cluster of the active model.
    pub fn predict<V: AsRef<[f64]>>(
        &self,
        batch: &[V],
    ) -> Result<Vec<ClusterAssignment>, ClusterError> {
        let active = self.current().ok_or(ClusterError::NotLoaded)?;
        let model = active.read();
        model.predict(batch)
    }

    /// Folds `batch` into the active streaming model.
    ///
    /// With no model installed, a streaming model with the configured
    /// cluster count is created from this batch first.
    pub fn partial_fit<V: AsRef<[f64]>>(&self, batch: &[V]) -> Result<ModelMetadata, ClusterError> {
        match self.current() {
            Some(active) => fit_active(&active, batch),
            None => self.cold_start(batch),
        }
    }

    fn cold_start<V: AsRef<[f64]>>(&self, batch: &[V]) -> Result<ModelMetadata, ClusterError> {
        let mut slot = self.slot.write();
        // Another caller may have installed a model while we waited.
        let existing = slot.clone();
        if let Some(active) = existing {
            drop(slot);
            return fit_active(&active, batch);
        }

        let model = Model::Streaming(StreamingClusterer::cold_start(self.n_clusters, batch)?);
        let meta = model.metadata();
        *slot = Some(Arc::new(RwLock::new(model)));
        info!(
            n_clusters = meta.n_clusters,
            feature_dim = meta.feature_dim,
            "streaming model created from first batch"
        );
        Ok(meta)
    }

    /// Persists a snapshot of the active model to `path`.
    ///
    /// The model lock is released before any disk I/O starts.
    pub fn save_model(&self, path: &Path) -> Result<ModelMetadata, ClusterError> {
        let active = self.current().ok_or(ClusterError::NotLoaded)?;
        let snapshot = active.read().clone();
        persist::save_file(&snapshot, path)?;
        Ok(snapshot.metadata())
    }
}

fn fit_active<V: AsRef<[f64]>>(active: &ActiveModel, batch: &[V]) -> Result<ModelMetadata, ClusterError> {
    let mut model = active.write();
    let Model::Streaming(streaming) = &mut *model else {
        return Err(ClusterError::MethodMismatch {
            expected: Method::Streaming,
            found: Method::Static,
        });
    };
    streaming.partial_fit(batch)?;
    Ok(model.metadata())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_model::StaticClusterer;

    fn registry(n_clusters: usize) -> ModelRegistry {
        ModelRegistry::new(Config { n_clusters }).unwrap()
    }

    #[test]
    fn new_rejects_zero_clusters() {
        assert!(matches!(
            ModelRegistry::new(Config { n_clusters: 0 }),
            Err(ClusterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn not_loaded_errors() {
        let reg = registry(2);
        assert!(!reg.is_loaded());
        assert!(matches!(reg.model_info(), Err(ClusterError::NotLoaded)));
        assert!(matches!(
            reg.predict(&[[1.0, 2.0]]),
            Err(ClusterError::NotLoaded)
        ));
        assert!(matches!(
            reg.save_model(Path::new("unused")),
            Err(ClusterError::NotLoaded)
        ));
    }

    #[test]
    fn predict_tie_break_both_methods() {
        let centroids = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let reg = registry(2);

        reg.install(Model::Static(StaticClusterer::new(centroids.clone()).unwrap()));
        assert_eq!(reg.predict(&[[0.0, 0.0]]).unwrap()[0].cluster_id, 0);

        reg.install(Model::Streaming(
            StreamingClusterer::new(centroids, vec![1, 1]).unwrap(),
        ));
        assert_eq!(reg.predict(&[[0.0, 0.0]]).unwrap()[0].cluster_id, 0);
    }

    #[test]
    fn partial_fit_on_static_is_method_mismatch() {
        let reg = registry(1);
        reg.install(Model::Static(StaticClusterer::new(vec![vec![1.0]]).unwrap()));
        match reg.partial_fit(&[[2.0]]) {
            Err(ClusterError::MethodMismatch { expected, found }) => {
                assert_eq!(expected, Method::Streaming);
                assert_eq!(found, Method::Static);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(reg.predict(&[[2.0]]).unwrap()[0].distance, 1.0);
    }

    #[test]
    fn partial_fit_cold_start() {
        let reg = registry(2);
        let meta = reg
            .partial_fit(&[[0.0, 0.0], [10.0, 10.0], [1.0, 1.0]])
            .unwrap();
        assert!(reg.is_loaded());
        assert_eq!(meta.method, Method::Streaming);
        assert_eq!(meta.n_clusters, 2);
        assert_eq!(meta.feature_dim, 2);
        assert_eq!(meta.sample_counts, Some(vec![2, 1]));

        let out = reg.predict(&[[0.4, 0.6], [9.0, 9.0]]).unwrap();
        assert_eq!(out[0].cluster_id, 0);
        assert_eq!(out[1].cluster_id, 1);
    }

    #[test]
    fn partial_fit_cold_start_failure_retains_nothing() {
        let reg = registry(3);
        assert!(matches!(
            reg.partial_fit(&[[1.0], [1.0], [2.0]]),
            Err(ClusterError::InsufficientData { needed: 3, distinct: 2 })
        ));
        assert!(!reg.is_loaded());
    }

    #[test]
    fn partial_fit_rejected_batch_leaves_model_untouched() {
        let reg = registry(2);
        reg.install(Model::Streaming(
            StreamingClusterer::new(vec![vec![0.0, 0.0], vec![5.0, 5.0]], vec![1, 1]).unwrap(),
        ));
        let before = reg.model_info().unwrap();

        let batch = vec![vec![1.0, 1.0], vec![1.0]];
        assert!(matches!(
            reg.partial_fit(&batch),
            Err(ClusterError::DimensionMismatch { index: 1, expected: 2, got: 1 })
        ));

        let after = reg.model_info().unwrap();
        assert_eq!(before, after);
        let out = reg.predict(&[[0.0, 0.0], [5.0, 5.0]]).unwrap();
        assert_eq!(out[0].distance, 0.0);
        assert_eq!(out[1].distance, 0.0);
    }

    #[test]
    fn install_replaces_previous_model() {
        let reg = registry(1);
        reg.install(Model::Static(StaticClusterer::new(vec![vec![0.0]]).unwrap()));
        let meta = reg.install(Model::Static(
            StaticClusterer::new(vec![vec![0.0, 0.0, 0.0]]).unwrap(),
        ));
        assert_eq!(meta.feature_dim, 3);
        assert_eq!(reg.model_info().unwrap().feature_dim, 3);
        assert!(reg.predict(&[[0.0]]).is_err());
    }
}
