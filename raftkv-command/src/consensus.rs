//! The slice of the consensus engine the command layer consumes.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Peer {0} already exists")]
    DuplicatePeer(String),

    #[error("Consensus unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Consensus: Send + Sync + 'static {
    /// Index of the highest committed log entry; never decreases.
    fn commit_index(&self) -> u64;

    /// Add `name` as a voting peer. A fresh join, no prior log is transferred.
    async fn add_peer(&self, name: &str, connection_info: &str) -> Result<(), ConsensusError>;
}

/// Peer set and commit index of a single process, used by [`crate::LocalNode`]
/// and in tests in place of a real consensus engine.
#[derive(Debug)]
pub struct InMemoryConsensus {
    name: String,
    commit_index: AtomicU64,
    peers: DashMap<String, String>,
}

impl InMemoryConsensus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commit_index: AtomicU64::new(0),
            peers: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark every entry up to `index` as committed.
    pub fn advance_commit_index(&self, index: u64) {
        self.commit_index.fetch_max(index, Ordering::SeqCst);
    }

    /// Peer names in sorted order; the local node is not listed.
    pub fn peers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.peers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn peer_connection(&self, name: &str) -> Option<String> {
        self.peers.get(name).map(|e| e.value().clone())
    }
}

#[async_trait]
impl Consensus for InMemoryConsensus {
    fn commit_index(&self) -> u64 {
        self.commit_index.load(Ordering::SeqCst)
    }

    async fn add_peer(&self, name: &str, connection_info: &str) -> Result<(), ConsensusError> {
        // Adding ourselves is a no-op: the local server is always a member.
        if name == self.name {
            return Ok(());
        }
        match self.peers.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ConsensusError::DuplicatePeer(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(connection_info.to_string());
                info!(peer = name, connection_info, "added peer");
                Ok(())
            }
        }
    }
}
