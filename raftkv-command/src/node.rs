//! Single-process node: a local log standing in for the consensus engine.
//!
//! Proposals are assigned consecutive indexes, recorded, marked committed and
//! handed to the apply loop. Useful for running one node on its own and for
//! replaying the committed log into another replica.

use std::sync::Arc;

use raftkv_store::KvStore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::applier::{Applier, CommittedEntry, PendingResponse, StateMachine};
use crate::commands::{Command, CommandResponse};
use crate::config::ClusterConfig;
use crate::consensus::{Consensus, InMemoryConsensus};
use crate::context::ExecutionContext;
use crate::errors::{CommandError, Result};

pub struct LocalNode {
    consensus: Arc<InMemoryConsensus>,
    ctx: ExecutionContext,
    applier: Applier,
    log: Mutex<LocalLog>,
    apply_handle: JoinHandle<()>,
}

struct LocalLog {
    next_index: u64,
    entries: Vec<CommittedEntry>,
}

impl LocalNode {
    /// Start the apply loop for a node called `name` over `store`.
    pub fn start(name: &str, store: Arc<dyn KvStore>, config: ClusterConfig) -> Self {
        let consensus = Arc::new(InMemoryConsensus::new(name));
        let ctx = ExecutionContext::new(store, consensus.clone(), config);
        let (applier, apply_handle) = Applier::spawn(StateMachine::new(ctx.clone()));

        info!(node = name, "local node started");
        Self {
            consensus,
            ctx,
            applier,
            log: Mutex::new(LocalLog {
                next_index: 1,
                entries: Vec::new(),
            }),
            apply_handle,
        }
    }

    pub fn name(&self) -> &str {
        self.consensus.name()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn consensus(&self) -> &InMemoryConsensus {
        &self.consensus
    }

    /// Move the log forward so the next proposal is assigned `index`, as if the
    /// positions before it had been taken by entries that are not commands
    /// (e.g. consensus configuration changes). Never moves the log backwards.
    pub async fn advance_to(&self, index: u64) {
        let mut log = self.log.lock().await;
        log.next_index = log.next_index.max(index);
    }

    /// Append `command` to the log, commit it and queue it for apply. The
    /// returned receiver resolves with the apply result.
    pub async fn submit(&self, command: impl Into<Command>) -> Result<PendingResponse> {
        let command: Command = command.into();
        let record = command.encode()?;

        // Held until the entry is queued so queue order matches log order.
        let mut log = self.log.lock().await;
        let index = log.next_index;
        log.next_index += 1;

        let entry = CommittedEntry { index, record };
        log.entries.push(entry.clone());
        self.consensus.advance_commit_index(index);
        debug!(index, command = command.name(), "committed");

        self.applier.submit(entry).await
    }

    /// Propose `command` and wait until it has been applied.
    pub async fn propose(&self, command: impl Into<Command>) -> Result<CommandResponse> {
        let pending = self.submit(command).await?;
        pending.await.map_err(|_| CommandError::Stopped)?
    }

    /// Fast path for Get and Watch: run the command against local state
    /// without going through the log.
    pub async fn read(&self, command: impl Into<Command>) -> Result<CommandResponse> {
        let command: Command = command.into();
        if command.is_mutating() {
            return Err(CommandError::ReadOnlyViolation(command.name()));
        }
        command
            .apply(&self.ctx, self.consensus.commit_index())
            .await
    }

    /// Every entry committed so far, in log order.
    pub async fn committed_log(&self) -> Vec<CommittedEntry> {
        self.log.lock().await.entries.clone()
    }

    /// Clear pending watchers so a suspended apply can finish, then wait for
    /// the apply loop to drain.
    pub async fn shutdown(self) {
        self.ctx.store().clear_watchers().await;
        let LocalNode {
            applier,
            apply_handle,
            ..
        } = self;
        drop(applier);
        let _ = apply_handle.await;
        info!("local node stopped");
    }
}
