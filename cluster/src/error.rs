use std::path::PathBuf;

use thiserror::Error;

use crate::model::Method;

/// Errors returned by clustering operations.
///
/// No operation that returns an error leaves the active model partially
/// mutated.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster: no model loaded")]
    NotLoaded,

    #[error("cluster: method mismatch: expected {expected}, found {found}")]
    MethodMismatch { expected: Method, found: Method },

    #[error("cluster: dimension mismatch at vector {index}: expected {expected}, got {got}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("cluster: non-finite feature value in vector {index}")]
    NonFiniteValue { index: usize },

    #[error("cluster: corrupt model: {0}")]
    CorruptModel(String),

    #[error("cluster: model not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cluster: insufficient data: need {needed} distinct vectors, got {distinct}")]
    InsufficientData { needed: usize, distinct: usize },

    #[error("cluster: io: {0}")]
    Io(String),

    #[error("cluster: invalid config: {0}")]
    InvalidConfig(String),
}

impl ClusterError {
    /// Stable error kind reported to API callers.
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterError::NotLoaded => "NotLoadedError",
            ClusterError::MethodMismatch { .. } => "MethodMismatchError",
            ClusterError::DimensionMismatch { .. } => "DimensionMismatchError",
            ClusterError::NonFiniteValue { .. } => "NonFiniteValueError",
            ClusterError::CorruptModel(_) => "CorruptModelError",
            ClusterError::NotFound(_) => "NotFoundError",
            ClusterError::InsufficientData { .. } => "InsufficientDataError",
            ClusterError::Io(_) => "IoError",
            ClusterError::InvalidConfig(_) => "InvalidConfigError",
        }
    }
}
