//! Sequential apply path.
//!
//! Committed entries are applied strictly one after another, in commit order.
//! That ordering is the only mutual exclusion commands rely on: a TestAndSet
//! committed after another one always observes its effect.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::commands::CommandResponse;
use crate::context::ExecutionContext;
use crate::errors::{CommandError, Result};
use crate::registry::{CommandRegistry, LogRecord};

/// A log entry the consensus engine reported as committed.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedEntry {
    pub index: u64,
    pub record: LogRecord,
}

/// Result of an entry handed to the [`Applier`], delivered once it is applied.
pub type PendingResponse = oneshot::Receiver<Result<CommandResponse>>;

/// Node-local state machine: decodes committed entries and applies them.
pub struct StateMachine {
    ctx: ExecutionContext,
    registry: &'static CommandRegistry,
    last_applied: u64,
}

impl StateMachine {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self {
            ctx,
            registry: CommandRegistry::global(),
            last_applied: 0,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    /// Apply one committed entry.
    ///
    /// The entry's log position is consumed even when decoding or applying
    /// fails: the failure is the outcome of that entry on every node.
    pub async fn apply_entry(&mut self, entry: &CommittedEntry) -> Result<CommandResponse> {
        let commit_index = self.ctx.consensus().commit_index();
        if entry.index > commit_index {
            return Err(CommandError::NotCommitted {
                index: entry.index,
                commit_index,
            });
        }
        if entry.index <= self.last_applied {
            return Err(CommandError::OutOfOrder {
                index: entry.index,
                last_applied: self.last_applied,
            });
        }
        self.last_applied = entry.index;

        let command = self.registry.decode(&entry.record)?;
        debug!(index = entry.index, command = command.name(), "applying entry");

        let result = command.apply(&self.ctx, entry.index).await;
        if let Err(e) = &result {
            debug!(index = entry.index, command = command.name(), error = %e, "entry applied with error");
        }
        result
    }
}

struct ApplyRequest {
    entry: CommittedEntry,
    responder: oneshot::Sender<Result<CommandResponse>>,
}

/// Handle to the task that owns a [`StateMachine`] and feeds it entries one at
/// a time. Cloning the handle shares the same task.
#[derive(Clone)]
pub struct Applier {
    tx: mpsc::Sender<ApplyRequest>,
}

impl Applier {
    /// Spawn the apply loop. It stops once every handle has been dropped and
    /// the queued entries are drained.
    pub fn spawn(machine: StateMachine) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ApplyRequest>(1024);

        let handle = tokio::spawn(async move {
            let mut machine = machine;
            while let Some(request) = rx.recv().await {
                let result = machine.apply_entry(&request.entry).await;
                if request.responder.send(result).is_err() {
                    debug!(index = request.entry.index, "proposer went away before the result");
                }
            }
            debug!(last_applied = machine.last_applied(), "apply loop stopped");
        });

        (Self { tx }, handle)
    }

    /// Queue a committed entry; the returned receiver resolves once it is applied.
    pub async fn submit(&self, entry: CommittedEntry) -> Result<PendingResponse> {
        let (responder, rx) = oneshot::channel();
        self.tx
            .send(ApplyRequest { entry, responder })
            .await
            .map_err(|_| {
                warn!("apply loop is gone, entry dropped");
                CommandError::Stopped
            })?;
        Ok(rx)
    }

    /// Queue a committed entry and wait for its result.
    pub async fn apply(&self, entry: CommittedEntry) -> Result<CommandResponse> {
        let pending = self.submit(entry).await?;
        pending.await.map_err(|_| CommandError::Stopped)?
    }
}
