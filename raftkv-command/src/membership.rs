//! Membership records and the in-memory routing directory filled by Join.

use std::sync::Arc;

use dashmap::DashMap;
use raftkv_store::{normalize_key, KvStore};
use tracing::{debug, warn};

/// Directory under which every member keeps its permanent record.
pub const MACHINES_DIR: &str = "/_etcd/machines";

/// Store key of the membership record for `name`.
pub fn machine_key(name: &str) -> String {
    normalize_key(&format!("{}/{}", MACHINES_DIR, name))
}

/// Number of membership records currently persisted.
pub async fn machine_count(store: &dyn KvStore) -> usize {
    store.children(MACHINES_DIR).await.len()
}

/// Routing endpoints of one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineUrls {
    pub raft_url: String,
    pub etcd_url: String,
}

impl MachineUrls {
    pub fn new(raft_url: impl Into<String>, etcd_url: impl Into<String>) -> Self {
        Self {
            raft_url: raft_url.into(),
            etcd_url: etcd_url.into(),
        }
    }

    /// Record value: `raft=<raftURL>&etcd=<etcdURL>`.
    pub fn encode(&self) -> String {
        format!("raft={}&etcd={}", self.raft_url, self.etcd_url)
    }

    pub fn decode(value: &str) -> Option<Self> {
        let rest = value.strip_prefix("raft=")?;
        let split = rest.rfind("&etcd=")?;
        Some(Self {
            raft_url: rest[..split].to_string(),
            etcd_url: rest[split + "&etcd=".len()..].to_string(),
        })
    }
}

/// Name to endpoints routing table shared by everything running on the node.
#[derive(Debug, Clone, Default)]
pub struct MachineDirectory {
    machines: Arc<DashMap<String, MachineUrls>>,
}

impl MachineDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, urls: MachineUrls) {
        debug!(name, raft_url = %urls.raft_url, etcd_url = %urls.etcd_url, "registered machine");
        self.machines.insert(name.to_string(), urls);
    }

    pub fn lookup(&self, name: &str) -> Option<MachineUrls> {
        self.machines.get(name).map(|e| e.value().clone())
    }

    pub fn raft_url(&self, name: &str) -> Option<String> {
        self.lookup(name).map(|u| u.raft_url)
    }

    pub fn etcd_url(&self, name: &str) -> Option<String> {
        self.lookup(name).map(|u| u.etcd_url)
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.machines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Rebuild the directory from the persisted membership records, e.g. after
    /// a restart where the routing table was lost but the store survived.
    /// Returns how many members were registered.
    pub async fn recover(&self, store: &dyn KvStore) -> usize {
        let mut recovered = 0;
        for key in store.children(MACHINES_DIR).await {
            let Some(name) = key.rsplit('/').next() else {
                continue;
            };
            let Some(node) = store.raw_get(&key).await else {
                continue;
            };
            match MachineUrls::decode(&node.value) {
                Some(urls) => {
                    self.register(name, urls);
                    recovered += 1;
                }
                None => warn!(%key, value = %node.value, "skipping malformed membership record"),
            }
        }
        recovered
    }
}
