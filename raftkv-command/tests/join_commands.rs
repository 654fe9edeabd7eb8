//! # Join command
//!
//! Membership changes: replay detection, capacity, and the non-transactional
//! side effects when the consensus engine refuses the new peer.

mod common;

use std::sync::Arc;

use raftkv_command::{
    machine_key, ClusterConfig, Command, CommandError, CommandResponse, ConsensusError,
    DeleteCommand, ExecutionContext, JoinCommand, MachineUrls, JOIN_SUCCESS,
};
use raftkv_store::{is_permanent, KvStore, MemoryStore, StoreError};

use common::{within, UnreachableConsensus};

/// **What**: A successful join, checked field by field.
///
/// **Checks**:
/// - Routing directory, peer list and membership record are all written
/// - The record is permanent and stamped with the join's index
#[tokio::test]
async fn join_registers_route_peer_and_record() {
    let (node, store) = common::start_node("node1", 5);

    let resp = within(node.propose(JoinCommand::new(
        "node2",
        "http://10.0.0.2:7001",
        "http://10.0.0.2:4001",
    )))
    .await
    .unwrap();
    assert_eq!(resp, CommandResponse::Join(JOIN_SUCCESS.to_vec()));
    assert_eq!(resp.to_bytes().unwrap(), b"join success".to_vec());

    assert_eq!(
        node.context().machines().raft_url("node2").as_deref(),
        Some("http://10.0.0.2:7001")
    );
    assert_eq!(
        node.consensus().peer_connection("node2").as_deref(),
        Some("http://10.0.0.2:7001")
    );

    let record = store.raw_get("/_etcd/machines/node2").await.unwrap();
    assert_eq!(
        record.value,
        "raft=http://10.0.0.2:7001&etcd=http://10.0.0.2:4001"
    );
    assert!(is_permanent(&record.expire_time));
    assert_eq!(record.modified_index, 1);
}

/// **What**: Join of the node itself, as done at bootstrap.
///
/// **Checks**:
/// - The record is written but the node is not listed as its own peer
#[tokio::test]
async fn self_join_is_recorded_without_peer() {
    let (node, store) = common::start_node("node1", 1);

    within(node.propose(JoinCommand::new("node1", "r1", "e1")))
        .await
        .unwrap();
    assert!(node.consensus().peers().is_empty());
    assert!(store.raw_get(&machine_key("node1")).await.is_some());
}

/// **What**: A replayed join on a full cluster.
///
/// **Checks**:
/// - A machine already recorded succeeds even though the cluster is at
///   capacity, since the replay check runs first
#[tokio::test]
async fn replay_skips_capacity_check() {
    let (node, _store) = common::start_node("node1", 1);

    within(node.propose(JoinCommand::new("node1", "r1", "e1")))
        .await
        .unwrap();
    let again = within(node.propose(JoinCommand::new("node1", "r1", "e1")))
        .await
        .unwrap();
    assert_eq!(again, CommandResponse::Join(JOIN_SUCCESS.to_vec()));
}

/// **What**: The consensus engine rejects the new peer.
///
/// **Checks**:
/// - The command fails with PeerAddFailed carrying the `join success` payload
/// - The routing entry and the membership record remain in place
/// - Retrying the same join is a replay and succeeds
#[tokio::test]
async fn peer_add_failure_keeps_storage_effects() {
    let store = MemoryStore::new();
    let ctx = ExecutionContext::new(
        Arc::new(store.clone()),
        Arc::new(UnreachableConsensus::committed_up_to(10)),
        ClusterConfig::default(),
    );
    let join = Command::from(JoinCommand::new("node9", "http://n9:7001", "http://n9:4001"));

    let err = join.apply(&ctx, 4).await.unwrap_err();
    match &err {
        CommandError::PeerAddFailed { name, source } => {
            assert_eq!(name, "node9");
            assert_eq!(source, &ConsensusError::Unavailable("no leader".to_string()));
        }
        other => panic!("expected PeerAddFailed, got {:?}", other),
    }
    assert_eq!(err.payload(), Some(JOIN_SUCCESS));

    assert_eq!(
        ctx.machines().lookup("node9"),
        Some(MachineUrls::new("http://n9:7001", "http://n9:4001"))
    );
    let record = store.raw_get(&machine_key("node9")).await.unwrap();
    assert_eq!(record.modified_index, 4);

    let retry = join.apply(&ctx, 5).await.unwrap();
    assert_eq!(retry, CommandResponse::Join(JOIN_SUCCESS.to_vec()));
    assert_eq!(store.raw_get(&machine_key("node9")).await.unwrap().modified_index, 4);
}

/// **What**: The membership record is deleted while the peer stays in the
/// consensus engine, then the machine joins again.
///
/// **Checks**:
/// - The duplicate peer is reported as PeerAddFailed
/// - The record is written again regardless
#[tokio::test]
async fn rejoin_after_record_loss_reports_duplicate_peer() {
    let (node, store) = common::start_node("node1", 5);

    within(node.propose(JoinCommand::new("node2", "r2", "e2")))
        .await
        .unwrap();
    within(node.propose(DeleteCommand::new(machine_key("node2"))))
        .await
        .unwrap();

    let err = within(node.propose(JoinCommand::new("node2", "r2", "e2")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::PeerAddFailed {
            source: ConsensusError::DuplicatePeer(_),
            ..
        }
    ));
    assert_eq!(err.code(), Some(300));

    let record = store.raw_get(&machine_key("node2")).await.unwrap();
    assert_eq!(record.modified_index, 3);
    assert_eq!(node.consensus().peers(), vec!["node2".to_string()]);
}

/// **What**: Joins whose name is not a single path segment.
///
/// **Checks**:
/// - Empty names and names containing `/` fail with InvalidArguments (200)
/// - Nothing is registered, so a later valid join still meets the capacity limit
#[tokio::test]
async fn join_with_invalid_name_is_rejected_without_effects() {
    let (node, store) = common::start_node("node1", 1);

    for name in ["", "node2/", "a/b", "../node1"] {
        let err = within(node.propose(JoinCommand::new(name, "r0", "e0")))
            .await
            .unwrap_err();
        assert!(
            matches!(err, CommandError::Store(StoreError::InvalidArguments(_))),
            "unexpected error for {name:?}: {err}"
        );
        assert_eq!(err.code(), Some(200));
        assert_eq!(err.payload(), None);
    }

    assert!(node.consensus().peers().is_empty());
    assert!(node.context().machines().raft_url("").is_none());
    assert!(store.raw_get("/_etcd/machines").await.is_none());

    within(node.propose(JoinCommand::new("nodeA", "ra", "ea")))
        .await
        .unwrap();
    let err = within(node.propose(JoinCommand::new("nodeB", "rb", "eb")))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::ClusterFull { max: 1, .. }));
    assert_eq!(node.consensus().peers(), vec!["nodeA".to_string()]);
}
