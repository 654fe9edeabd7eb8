use serde::{Deserialize, Serialize};

fn default_max_cluster_size() -> usize {
    9
}

fn default_watch_history_capacity() -> usize {
    raftkv_store::DEFAULT_HISTORY_CAPACITY
}

/// Cluster-wide settings every node must agree on, since they influence how
/// committed commands are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Join requests from new machines are rejected once this many are registered.
    #[serde(default = "default_max_cluster_size")]
    pub max_cluster_size: usize,
    /// Change events retained by the store for `sinceIndex` watches.
    #[serde(default = "default_watch_history_capacity")]
    pub watch_history_capacity: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_cluster_size: default_max_cluster_size(),
            watch_history_capacity: default_watch_history_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: ClusterConfig = serde_yaml::from_str("max_cluster_size: 3").unwrap();
        assert_eq!(cfg.max_cluster_size, 3);
        assert_eq!(cfg.watch_history_capacity, 1000);

        let cfg: ClusterConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, ClusterConfig::default());
    }
}
