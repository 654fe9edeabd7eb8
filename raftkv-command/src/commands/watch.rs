use raftkv_store::WatchNotification;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CommandResponse;
use crate::context::ExecutionContext;
use crate::errors::{CommandError, Result};

/// Wait for one change to `key` or anything below it.
///
/// Applying a Watch suspends the caller until the store resolves the watcher.
/// Through the log that means the node's apply loop waits too, so entries
/// committed after it are held back until the watch resolves or is cleared.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WatchCommand {
    pub key: String,
    /// 0 waits for the next change; N waits for the first change indexed N or later.
    #[serde(rename = "sinceIndex", default)]
    pub since_index: u64,
}

impl WatchCommand {
    pub fn new(key: impl Into<String>, since_index: u64) -> Self {
        Self {
            key: key.into(),
            since_index,
        }
    }

    pub(crate) async fn apply(&self, ctx: &ExecutionContext) -> Result<CommandResponse> {
        let watcher = ctx
            .store()
            .add_watcher(&self.key, self.since_index)
            .await?;
        debug!(
            key = %self.key,
            since_index = self.since_index,
            watcher = watcher.id(),
            "waiting for change"
        );

        match watcher.wait().await {
            WatchNotification::Changed(event) => {
                debug!(key = %event.key, index = event.index, "watch resolved");
                Ok(CommandResponse::Event(serde_json::to_vec(&event)?))
            }
            WatchNotification::Cleared => Err(CommandError::WatchCleared(self.key.clone())),
        }
    }
}
