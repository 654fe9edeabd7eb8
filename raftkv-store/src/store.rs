use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::watch::{Watcher, WatcherId};

/// The explicit "never expires" marker (Unix epoch).
pub fn permanent() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Any expire time at or before the Unix epoch means the key never expires.
/// This covers both the explicit epoch marker and the zero time
/// (`0001-01-01T00:00:00Z`) that older proposers send when no TTL was given.
pub fn is_permanent(expire_time: &DateTime<Utc>) -> bool {
    expire_time.timestamp() <= 0
}

/// Canonical form of a key: rooted at `/`, no empty or trailing segments.
pub fn normalize_key(key: &str) -> String {
    let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// The stored entry behind a key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub value: String,
    pub expire_time: DateTime<Utc>,
    /// Commit index of the entry that last wrote this key.
    pub modified_index: u64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Get,
    Set,
    TestAndSet,
    Delete,
}

/// Change descriptor returned by every store operation and delivered to watchers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub action: Action,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub new_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    pub index: u64,
}

/// Store operations consumed by the command layer.
///
/// Every mutating call takes the commit index of the log entry being applied;
/// the store stamps it on the node and on the event handed to watchers.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Response>;

    /// Lookup without producing a change descriptor; absence is not an error.
    async fn raw_get(&self, key: &str) -> Option<Node>;

    async fn set(
        &self,
        key: &str,
        value: &str,
        expire_time: DateTime<Utc>,
        index: u64,
    ) -> Result<Response>;

    async fn test_and_set(
        &self,
        key: &str,
        prev_value: &str,
        value: &str,
        expire_time: DateTime<Utc>,
        index: u64,
    ) -> Result<Response>;

    async fn delete(&self, key: &str, index: u64) -> Result<Response>;

    /// Register a single-shot watcher on `key` and everything below it.
    ///
    /// `since_index == 0` waits for the next mutation; otherwise the first
    /// mutation with an index at or above `since_index`, looking at retained
    /// history first.
    async fn add_watcher(&self, key: &str, since_index: u64) -> Result<Watcher>;

    /// Full paths of every key strictly below `prefix`.
    async fn children(&self, prefix: &str) -> Vec<String>;

    /// Resolve one pending watcher with the cancellation sentinel.
    async fn cancel_watcher(&self, key: &str, id: WatcherId) -> bool;

    /// Resolve every pending watcher with the cancellation sentinel.
    async fn clear_watchers(&self);
}
