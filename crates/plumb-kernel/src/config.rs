//! Node configuration.
//!
//! Configuration is loaded from `~/.config/plumb/node.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use plumb_types::DEFAULT_MAX_LINE;

use crate::namespace::DEFAULT_NAMESPACE;
use crate::pipe::{DEFAULT_READER_QUEUE, PipeSettings};

/// Configuration for one plumb node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlumbConfig {
    /// This node's name in the cluster.
    #[serde(default = "default_node")]
    pub node: String,

    /// Address the remote proxy listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Namespace bare pipe names are qualified into.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Per-reader queue capacity.
    #[serde(default = "default_reader_queue")]
    pub reader_queue: usize,

    /// Longest accepted line on framed streams, in bytes.
    #[serde(default = "default_max_line")]
    pub max_line: usize,

    /// Other nodes by name, as `host:port`.
    #[serde(default)]
    pub peers: BTreeMap<String, String>,
}

fn default_node() -> String {
    "local".to_string()
}

fn default_listen() -> String {
    "127.0.0.1:9331".to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_reader_queue() -> usize {
    DEFAULT_READER_QUEUE
}

fn default_max_line() -> usize {
    DEFAULT_MAX_LINE
}

impl Default for PlumbConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            listen: default_listen(),
            namespace: default_namespace(),
            reader_queue: default_reader_queue(),
            max_line: default_max_line(),
            peers: BTreeMap::new(),
        }
    }
}

impl PlumbConfig {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the default config file path.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "plumb")
            .context("Could not determine config directory")?;

        Ok(dirs.config_dir().join("node.toml"))
    }

    /// Delivery limits for pipes created under this config.
    pub fn settings(&self) -> PipeSettings {
        PipeSettings {
            reader_queue: self.reader_queue.max(1),
            max_line: self.max_line,
        }
    }
}
