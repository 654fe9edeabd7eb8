//! Shared helpers for `raftkv-command` integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use raftkv_command::{ClusterConfig, Consensus, ConsensusError, LocalNode};
use raftkv_store::MemoryStore;

/// Start a local node over a fresh in-memory store. The store handle is
/// returned so tests can inspect content directly.
pub fn start_node(name: &str, max_cluster_size: usize) -> (LocalNode, MemoryStore) {
    let store = MemoryStore::new();
    let config = ClusterConfig {
        max_cluster_size,
        ..ClusterConfig::default()
    };
    let node = LocalNode::start(name, Arc::new(store.clone()), config);
    (node, store)
}

/// Await `fut`, failing the test if it takes longer than two seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out")
}

/// Consensus handle whose peer additions always fail.
#[derive(Default)]
pub struct UnreachableConsensus {
    commit_index: AtomicU64,
}

impl UnreachableConsensus {
    pub fn committed_up_to(index: u64) -> Self {
        Self {
            commit_index: AtomicU64::new(index),
        }
    }
}

#[async_trait]
impl Consensus for UnreachableConsensus {
    fn commit_index(&self) -> u64 {
        self.commit_index.load(Ordering::SeqCst)
    }

    async fn add_peer(&self, _name: &str, _connection_info: &str) -> Result<(), ConsensusError> {
        Err(ConsensusError::Unavailable("no leader".to_string()))
    }
}
