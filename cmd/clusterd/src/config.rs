//! Service configuration loaded from YAML or JSON.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clusterd_cluster::Method;
use serde::{Deserialize, Serialize};

/// Default listen address.
pub const DEFAULT_LISTEN: &str = ":8000";

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address; `:port` binds all interfaces.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Cluster count for streaming models created from the first batch.
    #[serde(default = "default_n_clusters")]
    pub n_clusters: usize,

    /// Model to load at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// Method of `model_path`.
    #[serde(default = "default_method")]
    pub method: Method,

    /// Where to save the active model on shutdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_on_shutdown: Option<PathBuf>,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_n_clusters() -> usize {
    3
}

fn default_method() -> Method {
    Method::Static
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            n_clusters: default_n_clusters(),
            model_path: None,
            method: default_method(),
            persist_on_shutdown: None,
        }
    }
}

impl ServerConfig {
    /// Loads the config file, or returns defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = std::fs::read(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let cfg: Self = match ext {
            "json" => serde_json::from_slice(&data)?,
            _ => serde_yaml::from_slice(&data)?,
        };
        Ok(cfg)
    }

    /// Rejects settings the service cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            anyhow::bail!("n_clusters must be positive");
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Parses `listen`, expanding `:port` to `0.0.0.0:port`.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.listen)
    }
}

/// Parse address string to SocketAddr.
pub fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    addr.parse()
        .with_context(|| format!("invalid listen address {addr:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = ServerConfig::load(None).unwrap();
        assert_eq!(cfg.listen, ":8000");
        assert_eq!(cfg.n_clusters, 3);
        assert_eq!(cfg.method, Method::Static);
        assert!(cfg.model_path.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn load_yaml_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusterd.yaml");
        std::fs::write(
            &path,
            "n_clusters: 5\nmodel_path: output/models/streaming_cluster_model\nmethod: streaming\n",
        )
        .unwrap();

        let cfg = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.n_clusters, 5);
        assert_eq!(cfg.method, Method::Streaming);
        assert_eq!(
            cfg.model_path.as_deref(),
            Some(Path::new("output/models/streaming_cluster_model"))
        );
        assert_eq!(cfg.listen, ":8000");
    }

    #[test]
    fn load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusterd.json");
        std::fs::write(&path, r#"{"listen": "127.0.0.1:9000", "n_clusters": 2}"#).unwrap();

        let cfg = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.listen_addr().unwrap().port(), 9000);
        assert_eq!(cfg.n_clusters, 2);
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(ServerConfig::load(Some(Path::new("/nonexistent/clusterd.yaml"))).is_err());
    }

    #[test]
    fn validate_rejects_zero_clusters() {
        let cfg = ServerConfig {
            n_clusters: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_addr_forms() {
        assert_eq!(parse_addr(":8080").unwrap().to_string(), "0.0.0.0:8080");
        assert_eq!(parse_addr("127.0.0.1:1").unwrap().port(), 1);
        assert!(parse_addr("not an address").is_err());
    }
}
