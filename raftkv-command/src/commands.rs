//! Replicated commands and the responses they produce.
//!
//! Every state transition of the store is one of these variants. A command is
//! encoded into a [`LogRecord`], proposed, and once committed applied on every
//! node with the commit index of its own log entry.

mod join;
mod kv;
mod watch;

pub use join::{JoinCommand, JOIN_FAIL, JOIN_SUCCESS};
pub use kv::{DeleteCommand, GetCommand, SetCommand, TestAndSetCommand};
pub use watch::WatchCommand;

use raftkv_store::Response;

use crate::context::ExecutionContext;
use crate::errors::Result;
use crate::registry::LogRecord;

/// Namespace of every command type identifier written to the log.
pub const COMMAND_PREFIX: &str = "etcd:";

/// Stable type identifier of a command variant. Changing one breaks every log
/// already replicated with it.
pub trait CommandName {
    const NAME: &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set(SetCommand),
    TestAndSet(TestAndSetCommand),
    Get(GetCommand),
    Delete(DeleteCommand),
    Watch(WatchCommand),
    Join(JoinCommand),
}

/// Result of applying a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResponse {
    /// Change descriptor from Set, TestAndSet, Get and Delete.
    Change(Response),
    /// Serialized change event that resolved a Watch.
    Event(Vec<u8>),
    /// Literal Join payload.
    Join(Vec<u8>),
}

impl CommandResponse {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            CommandResponse::Change(resp) => Ok(serde_json::to_vec(resp)?),
            CommandResponse::Event(bytes) | CommandResponse::Join(bytes) => Ok(bytes.clone()),
        }
    }

    pub fn change(&self) -> Option<&Response> {
        match self {
            CommandResponse::Change(resp) => Some(resp),
            _ => None,
        }
    }
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set(_) => SetCommand::NAME,
            Command::TestAndSet(_) => TestAndSetCommand::NAME,
            Command::Get(_) => GetCommand::NAME,
            Command::Delete(_) => DeleteCommand::NAME,
            Command::Watch(_) => WatchCommand::NAME,
            Command::Join(_) => JoinCommand::NAME,
        }
    }

    /// Whether applying the command can change store or membership state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Command::Get(_) | Command::Watch(_))
    }

    pub fn encode(&self) -> Result<LogRecord> {
        let payload = match self {
            Command::Set(c) => serde_json::to_value(c)?,
            Command::TestAndSet(c) => serde_json::to_value(c)?,
            Command::Get(c) => serde_json::to_value(c)?,
            Command::Delete(c) => serde_json::to_value(c)?,
            Command::Watch(c) => serde_json::to_value(c)?,
            Command::Join(c) => serde_json::to_value(c)?,
        };
        Ok(LogRecord {
            type_identifier: self.name().to_string(),
            payload,
        })
    }

    /// Apply the command as the entry committed at `index`.
    pub async fn apply(&self, ctx: &ExecutionContext, index: u64) -> Result<CommandResponse> {
        match self {
            Command::Set(c) => c.apply(ctx, index).await,
            Command::TestAndSet(c) => c.apply(ctx, index).await,
            Command::Get(c) => c.apply(ctx).await,
            Command::Delete(c) => c.apply(ctx, index).await,
            Command::Watch(c) => c.apply(ctx).await,
            Command::Join(c) => c.apply(ctx, index).await,
        }
    }
}

macro_rules! command_variant {
    ($ty:ident, $variant:ident, $name:literal) => {
        impl CommandName for $ty {
            const NAME: &'static str = concat!("etcd:", $name);
        }

        impl From<$ty> for Command {
            fn from(cmd: $ty) -> Self {
                Command::$variant(cmd)
            }
        }
    };
}

command_variant!(SetCommand, Set, "set");
command_variant!(TestAndSetCommand, TestAndSet, "testAndSet");
command_variant!(GetCommand, Get, "get");
command_variant!(DeleteCommand, Delete, "delete");
command_variant!(WatchCommand, Watch, "watch");
command_variant!(JoinCommand, Join, "join");
