//! Nearest-centroid clustering models for online serving.
//!
//! Two model families share the same prediction rule (Euclidean distance,
//! lowest centroid index wins ties):
//!
//! - [`StaticClusterer`]: trained offline, immutable once loaded.
//! - [`StreamingClusterer`]: updated in place by `partial_fit`, each centroid
//!   tracking the running mean of the vectors assigned to it.
//!
//! [`ModelRegistry`] holds the single active model and arbitrates concurrent
//! `predict` / `partial_fit` / `load_model` calls.
//!
//! # Usage
//!
//! ```
//! use clusterd_cluster::{Config, ModelRegistry};
//!
//! let reg = ModelRegistry::new(Config { n_clusters: 2 }).unwrap();
//!
//! // No model loaded: the first batch seeds a streaming model.
//! reg.partial_fit(&[[0.0, 0.0], [10.0, 10.0], [1.0, 1.0]]).unwrap();
//!
//! let out = reg.predict(&[[9.0, 9.5]]).unwrap();
//! assert_eq!(out[0].cluster_id, 1);
//! ```

mod distance;
mod error;
pub mod kmeans;
mod model;
pub mod persist;
mod registry;
mod static_model;
mod streaming;

pub use distance::{euclidean, ClusterAssignment};
pub use error::ClusterError;
pub use kmeans::{KMeansFit, KMeansOptions};
pub use model::{Method, Model, ModelMetadata};
pub use registry::{Config, ModelRegistry};
pub use static_model::StaticClusterer;
pub use streaming::StreamingClusterer;
