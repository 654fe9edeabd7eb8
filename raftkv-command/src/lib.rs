//! `raftkv-command` — the replicated command layer of raftkv.
//!
//! Commands are encoded into log records, proposed to the consensus engine,
//! and once committed decoded through the [`CommandRegistry`] and applied one
//! at a time, in commit order, by the [`Applier`]. Every node applying the same
//! committed sequence reaches the same store content.

pub mod applier;
pub mod commands;
pub mod config;
pub mod consensus;
pub mod context;
pub mod errors;
pub mod membership;
pub mod node;
pub mod registry;

pub use applier::{Applier, CommittedEntry, PendingResponse, StateMachine};
pub use commands::{
    Command, CommandName, CommandResponse, DeleteCommand, GetCommand, JoinCommand, SetCommand,
    TestAndSetCommand, WatchCommand, COMMAND_PREFIX, JOIN_FAIL, JOIN_SUCCESS,
};
pub use config::ClusterConfig;
pub use consensus::{Consensus, ConsensusError, InMemoryConsensus};
pub use context::ExecutionContext;
pub use errors::{CommandError, Result};
pub use membership::{machine_count, machine_key, MachineDirectory, MachineUrls, MACHINES_DIR};
pub use node::LocalNode;
pub use registry::{CommandRegistry, LogRecord};
