//! Offline commands: train a model file, inspect a model file.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args;
use clusterd_cluster::{kmeans, persist, KMeansOptions, Method};
use serde::Deserialize;
use tracing::info;

/// Train a model with k-means and write it to disk.
#[derive(Args, Debug)]
pub struct TrainCommand {
    /// Training vectors: JSON or YAML, either `[[f64, ...], ...]` or
    /// `{"data": [{"features": [...]}, ...]}`
    #[arg(short, long)]
    pub input: PathBuf,

    /// Number of clusters
    #[arg(short, long)]
    pub k: usize,

    /// Model family to write (static or streaming)
    #[arg(short, long, default_value = "static")]
    pub method: Method,

    /// Maximum k-means iterations
    #[arg(long, default_value_t = 100)]
    pub max_iter: usize,

    /// Convergence tolerance on centroid movement
    #[arg(long, default_value_t = 1e-6)]
    pub tol: f64,

    /// Output model path
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Print the metadata of a model file.
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Model path
    pub path: PathBuf,
}

/// Accepted training file layouts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TrainingData {
    Rows(Vec<Vec<f64>>),
    Batch { data: Vec<Row> },
}

#[derive(Debug, Deserialize)]
struct Row {
    features: Vec<f64>,
}

impl TrainingData {
    fn into_rows(self) -> Vec<Vec<f64>> {
        match self {
            TrainingData::Rows(rows) => rows,
            TrainingData::Batch { data } => data.into_iter().map(|r| r.features).collect(),
        }
    }
}

fn read_training_data(path: &Path) -> Result<Vec<Vec<f64>>> {
    let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let parsed: TrainingData = match ext {
        "yaml" | "yml" => serde_yaml::from_slice(&data)?,
        _ => serde_json::from_slice(&data)?,
    };
    Ok(parsed.into_rows())
}

impl TrainCommand {
    pub fn run(&self) -> Result<()> {
        let rows = read_training_data(&self.input)?;
        let opts = KMeansOptions {
            n_clusters: self.k,
            max_iter: self.max_iter,
            tol: self.tol,
        };
        let fit = kmeans::fit(&rows, &opts)?;
        info!(
            vectors = rows.len(),
            k = self.k,
            iterations = fit.iterations,
            inertia = fit.inertia,
            "training finished"
        );

        let model = fit.into_model(self.method)?;
        persist::save_file(&model, &self.output)?;
        println!("{}", serde_json::to_string_pretty(&model.metadata())?);
        Ok(())
    }
}

impl InspectCommand {
    pub fn run(&self) -> Result<()> {
        let model = persist::load_file(&self.path)?;
        println!("{}", serde_json::to_string_pretty(&model.metadata())?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_rows_and_batch_layouts() {
        let dir = tempfile::tempdir().unwrap();

        let rows = dir.path().join("rows.json");
        std::fs::write(&rows, "[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(
            read_training_data(&rows).unwrap(),
            vec![vec![1.0, 2.0], vec![3.0, 4.0]]
        );

        let batch = dir.path().join("batch.yaml");
        std::fs::write(&batch, "data:\n  - features: [1.0, 2.0]\n  - features: [5.0, 6.0]\n")
            .unwrap();
        assert_eq!(
            read_training_data(&batch).unwrap(),
            vec![vec![1.0, 2.0], vec![5.0, 6.0]]
        );
    }

    #[test]
    fn train_writes_loadable_model() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.json");
        std::fs::write(&input, "[[0.0], [0.2], [10.0], [10.2]]").unwrap();
        let output = dir.path().join("models").join("streaming_cluster_model");

        TrainCommand {
            input,
            k: 2,
            method: Method::Streaming,
            max_iter: 50,
            tol: 1e-9,
            output: output.clone(),
        }
        .run()
        .unwrap();

        let model = persist::load_file(&output).unwrap();
        assert_eq!(model.method(), Method::Streaming);
        assert_eq!(model.sample_counts(), Some(&[2u64, 2][..]));
        assert!((model.centroids()[0][0] - 0.1).abs() < 1e-12);
        assert!((model.centroids()[1][0] - 10.1).abs() < 1e-12);

        InspectCommand { path: output }.run().unwrap();
    }

    #[test]
    fn train_rejects_too_few_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.json");
        std::fs::write(&input, "[[1.0]]").unwrap();

        let result = TrainCommand {
            input,
            k: 2,
            method: Method::Static,
            max_iter: 10,
            tol: 1e-6,
            output: dir.path().join("out"),
        }
        .run();
        assert!(result.is_err());
        assert!(!dir.path().join("out").exists());
    }
}
