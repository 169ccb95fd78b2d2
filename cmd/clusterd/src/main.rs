//! clusterd - serve static and streaming clustering models over HTTP.

mod config;
mod server;
mod train;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clusterd_cluster::{Config, Method, ModelRegistry};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::ServerConfig;
use train::{InspectCommand, TrainCommand};

/// Clustering model server.
///
/// Loads a clustering model, answers predictions against it and, for
/// streaming models, updates it incrementally from incoming batches.
#[derive(Parser)]
#[command(name = "clusterd")]
#[command(about = "Clustering model server")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve(ServeCommand),
    /// Train a model file with k-means
    Train(TrainCommand),
    /// Print a model file's metadata
    Inspect(InspectCommand),
}

#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file (YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (e.g. :8000)
    #[arg(long)]
    listen: Option<String>,

    /// Cluster count for streaming models created from the first batch
    #[arg(long)]
    n_clusters: Option<usize>,

    /// Model to load at startup
    #[arg(long)]
    model: Option<PathBuf>,

    /// Method of --model (static or streaming)
    #[arg(long)]
    method: Option<Method>,

    /// Save the active model here on shutdown
    #[arg(long)]
    persist_on_shutdown: Option<PathBuf>,
}

impl ServeCommand {
    /// Config file values overridden by flags.
    fn resolve(&self) -> Result<ServerConfig> {
        let mut cfg = ServerConfig::load(self.config.as_deref())?;
        if let Some(listen) = &self.listen {
            cfg.listen = listen.clone();
        }
        if let Some(n) = self.n_clusters {
            cfg.n_clusters = n;
        }
        if let Some(path) = &self.model {
            cfg.model_path = Some(path.clone());
        }
        if let Some(method) = self.method {
            cfg.method = method;
        }
        if let Some(path) = &self.persist_on_shutdown {
            cfg.persist_on_shutdown = Some(path.clone());
        }
        cfg.validate()?;
        Ok(cfg)
    }

    async fn run(&self) -> Result<()> {
        let cfg = self.resolve()?;
        let registry = Arc::new(ModelRegistry::new(Config {
            n_clusters: cfg.n_clusters,
        })?);

        if let Some(path) = &cfg.model_path {
            let meta = registry.load_model(path, cfg.method)?;
            info!(
                path = %path.display(),
                method = %meta.method,
                n_clusters = meta.n_clusters,
                feature_dim = meta.feature_dim,
                "startup model loaded"
            );
        }

        server::serve(&cfg, registry).await
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Serve(cmd) => cmd.run().await,
        Commands::Train(cmd) => cmd.run(),
        Commands::Inspect(cmd) => cmd.run(),
    }
}
