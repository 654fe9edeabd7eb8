use std::sync::Arc;

use raftkv_store::KvStore;

use crate::config::ClusterConfig;
use crate::consensus::Consensus;
use crate::membership::MachineDirectory;

/// Everything a command may touch while it is applied on a node.
///
/// Cloning is cheap and clones share the same store, consensus handle and
/// routing directory.
#[derive(Clone)]
pub struct ExecutionContext {
    store: Arc<dyn KvStore>,
    consensus: Arc<dyn Consensus>,
    machines: MachineDirectory,
    config: ClusterConfig,
}

impl ExecutionContext {
    pub fn new(
        store: Arc<dyn KvStore>,
        consensus: Arc<dyn Consensus>,
        config: ClusterConfig,
    ) -> Self {
        Self {
            store,
            consensus,
            machines: MachineDirectory::new(),
            config,
        }
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn consensus(&self) -> &dyn Consensus {
        self.consensus.as_ref()
    }

    pub fn machines(&self) -> &MachineDirectory {
        &self.machines
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("commit_index", &self.consensus.commit_index())
            .field("machines", &self.machines.len())
            .field("config", &self.config)
            .finish()
    }
}
