use std::fs::read_to_string;
use std::path::Path;

use anyhow::{Context, Result};
use raftkv_command::ClusterConfig;
use serde::{Deserialize, Serialize};

/// configuration settings loaded from the config file
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NodeConfiguration {
    /// Machine name, unique in the cluster
    pub(crate) name: String,
    /// Address peers use for consensus traffic
    pub(crate) raft_url: String,
    /// Address clients use for key-value requests
    pub(crate) etcd_url: String,
    /// Cluster-wide settings, identical on every node
    #[serde(default)]
    pub(crate) cluster: ClusterConfig,
}

impl NodeConfiguration {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let content = read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    pub(crate) fn parse(content: &str) -> Result<Self> {
        let config: NodeConfiguration =
            serde_yaml::from_str(content).context("Failed to parse node configuration")?;
        if config.name.is_empty() {
            return Err(anyhow::anyhow!("Node name must not be empty"));
        }
        if config.cluster.max_cluster_size == 0 {
            return Err(anyhow::anyhow!("max_cluster_size must be at least 1"));
        }
        Ok(config)
    }
}
