use raftkv_store::{permanent, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::CommandResponse;
use crate::context::ExecutionContext;
use crate::errors::{CommandError, Result};
use crate::membership::{machine_count, machine_key, MachineUrls};

pub const JOIN_SUCCESS: &[u8] = b"join success";
pub const JOIN_FAIL: &[u8] = b"join fail";

/// Add a machine to the cluster.
///
/// A `name` that is empty or contains `/` is rejected before anything else
/// with `InvalidArguments`. Valid joins are applied in three steps on every node:
/// 1. an existing membership record for `name` makes the join a replay, and
///    it succeeds without touching anything;
/// 2. a cluster already holding `max_cluster_size` records rejects it with
///    `ClusterFull`, touching nothing;
/// 3. otherwise the routing entry is registered, the peer is added to the
///    consensus engine, and the permanent membership record is written.
///
/// Step 3 does not roll back. If adding the peer fails the record is written
/// anyway and the command reports `PeerAddFailed`; a retry of the same join is
/// then a replay.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct JoinCommand {
    pub name: String,
    #[serde(rename = "raftURL")]
    pub raft_url: String,
    #[serde(rename = "etcdURL")]
    pub etcd_url: String,
}

impl JoinCommand {
    pub fn new(
        name: impl Into<String>,
        raft_url: impl Into<String>,
        etcd_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            raft_url: raft_url.into(),
            etcd_url: etcd_url.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn apply(&self, ctx: &ExecutionContext, index: u64) -> Result<CommandResponse> {
        // The name is a single path segment under the machines directory.
        if self.name.is_empty() || self.name.contains('/') {
            warn!(name = %self.name, "rejecting join with invalid machine name");
            return Err(StoreError::InvalidArguments(format!(
                "invalid machine name {:?}",
                self.name
            ))
            .into());
        }

        let key = machine_key(&self.name);

        // A machine that lost its log rejoins under the same name.
        if ctx.store().raw_get(&key).await.is_some() {
            debug!(name = %self.name, "join replayed for known machine");
            return Ok(CommandResponse::Join(JOIN_SUCCESS.to_vec()));
        }

        let max = ctx.config().max_cluster_size;
        if machine_count(ctx.store()).await >= max {
            warn!(name = %self.name, max, "rejecting join, cluster is full");
            return Err(CommandError::ClusterFull {
                name: self.name.clone(),
                max,
            });
        }

        let urls = MachineUrls::new(&self.raft_url, &self.etcd_url);
        ctx.machines().register(&self.name, urls.clone());

        let peer_added = ctx.consensus().add_peer(&self.name, &self.raft_url).await;

        ctx.store()
            .set(&key, &urls.encode(), permanent(), index)
            .await?;

        match peer_added {
            Ok(()) => {
                info!(name = %self.name, raft_url = %self.raft_url, index, "machine joined");
                Ok(CommandResponse::Join(JOIN_SUCCESS.to_vec()))
            }
            Err(source) => {
                warn!(name = %self.name, error = %source, "membership recorded but peer add failed");
                Err(CommandError::PeerAddFailed {
                    name: self.name.clone(),
                    source,
                })
            }
        }
    }
}
