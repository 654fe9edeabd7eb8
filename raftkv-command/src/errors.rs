use raftkv_store::StoreError;
use thiserror::Error;

use crate::commands::{JOIN_FAIL, JOIN_SUCCESS};
use crate::consensus::ConsensusError;

pub type Result<T> = std::result::Result<T, CommandError>;

/// Outcomes of decoding or applying a command. None of them is fatal to the
/// node; they are returned to whoever proposed the command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Malformed payload for {command}: {source}")]
    MalformedPayload {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Compare failed on {key}: expected {expected:?}, found {actual:?}")]
    CompareMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Watch on {0} cleared")]
    WatchCleared(String),

    #[error("Event index {requested} is cleared, oldest retained index is {oldest}")]
    EventIndexCleared { requested: u64, oldest: u64 },

    #[error("Cluster is full ({max} machines), rejected join from {name}")]
    ClusterFull { name: String, max: usize },

    /// The membership record and routing entry were still written.
    #[error("Failed to add peer {name}: {source}")]
    PeerAddFailed {
        name: String,
        #[source]
        source: ConsensusError,
    },

    #[error("Entry {index} is not committed yet (commit index {commit_index})")]
    NotCommitted { index: u64, commit_index: u64 },

    #[error("Entry {index} is not after the last applied entry {last_applied}")]
    OutOfOrder { index: u64, last_applied: u64 },

    #[error("{0} mutates state and must be proposed through the log")]
    ReadOnlyViolation(&'static str),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State machine stopped")]
    Stopped,
}

impl CommandError {
    /// Client-facing error code, where the condition has one.
    pub fn code(&self) -> Option<u16> {
        match self {
            CommandError::KeyNotFound(_) => Some(100),
            CommandError::CompareMismatch { .. } => Some(101),
            CommandError::ClusterFull { .. } => Some(103),
            CommandError::UnknownCommand(_)
            | CommandError::MalformedPayload { .. }
            | CommandError::PeerAddFailed { .. } => Some(300),
            CommandError::WatchCleared(_) | CommandError::EventIndexCleared { .. } => Some(401),
            CommandError::Store(e) => Some(e.code()),
            _ => None,
        }
    }

    /// Response payload that accompanies the error, for Join outcomes.
    pub fn payload(&self) -> Option<&'static [u8]> {
        match self {
            CommandError::ClusterFull { .. } => Some(JOIN_FAIL),
            CommandError::PeerAddFailed { .. } => Some(JOIN_SUCCESS),
            _ => None,
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KeyNotFound(key) => CommandError::KeyNotFound(key),
            StoreError::TestFailed {
                key,
                expected,
                actual,
            } => CommandError::CompareMismatch {
                key,
                expected,
                actual,
            },
            StoreError::EventIndexCleared { requested, oldest } => {
                CommandError::EventIndexCleared { requested, oldest }
            }
            other => CommandError::Store(other),
        }
    }
}
