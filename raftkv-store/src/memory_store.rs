use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    errors::{Result, StoreError},
    store::{is_permanent, normalize_key, Action, KvStore, Node, Response},
    watch::{Watcher, WatcherHub, WatcherId},
};

/// Number of change events kept for `since_index` replay.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// In-memory store engine. Cheap to clone; clones share the same state.
///
/// Content is a pure function of the sequence of mutations and the indexes
/// they were applied with, so replicas fed the same log end up identical.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Debug)]
struct StoreState {
    nodes: BTreeMap<String, Node>,
    hub: WatcherHub,
    current_index: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        MemoryStore {
            inner: Arc::new(Mutex::new(StoreState {
                nodes: BTreeMap::new(),
                hub: WatcherHub::new(history_capacity),
                current_index: 0,
            })),
        }
    }

    /// Copy of the whole key space, used to compare replicas.
    pub async fn entries(&self) -> BTreeMap<String, Node> {
        self.inner.lock().await.nodes.clone()
    }

    /// Highest commit index any mutation was applied with.
    pub async fn current_index(&self) -> u64 {
        self.inner.lock().await.current_index
    }
}

fn writable_key(key: &str) -> Result<String> {
    let key = normalize_key(key);
    if key == "/" {
        return Err(StoreError::InvalidArguments(
            "cannot write to the root key".to_string(),
        ));
    }
    Ok(key)
}

fn expiration_of(expire_time: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    if is_permanent(expire_time) {
        None
    } else {
        Some(*expire_time)
    }
}

impl StoreState {
    fn write(
        &mut self,
        action: Action,
        key: String,
        value: &str,
        expire_time: DateTime<Utc>,
        index: u64,
    ) -> Response {
        let prev = self.nodes.insert(
            key.clone(),
            Node {
                value: value.to_string(),
                expire_time,
                modified_index: index,
            },
        );
        self.current_index = self.current_index.max(index);

        let response = Response {
            action,
            key,
            new_key: prev.is_none(),
            prev_value: prev.map(|n| n.value),
            value: Some(value.to_string()),
            expiration: expiration_of(&expire_time),
            index,
        };
        self.hub.notify(response.clone());
        response
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Response> {
        let key = normalize_key(key);
        let state = self.inner.lock().await;
        let node = state
            .nodes
            .get(&key)
            .ok_or_else(|| StoreError::KeyNotFound(key.clone()))?;

        Ok(Response {
            action: Action::Get,
            value: Some(node.value.clone()),
            expiration: expiration_of(&node.expire_time),
            index: node.modified_index,
            prev_value: None,
            new_key: false,
            key,
        })
    }

    async fn raw_get(&self, key: &str) -> Option<Node> {
        let key = normalize_key(key);
        self.inner.lock().await.nodes.get(&key).cloned()
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        expire_time: DateTime<Utc>,
        index: u64,
    ) -> Result<Response> {
        let key = writable_key(key)?;
        let mut state = self.inner.lock().await;
        debug!(%key, index, "set");
        Ok(state.write(Action::Set, key, value, expire_time, index))
    }

    async fn test_and_set(
        &self,
        key: &str,
        prev_value: &str,
        value: &str,
        expire_time: DateTime<Utc>,
        index: u64,
    ) -> Result<Response> {
        let key = writable_key(key)?;
        let mut state = self.inner.lock().await;

        let current = state
            .nodes
            .get(&key)
            .ok_or_else(|| StoreError::KeyNotFound(key.clone()))?;
        if current.value != prev_value {
            return Err(StoreError::TestFailed {
                expected: prev_value.to_string(),
                actual: current.value.clone(),
                key,
            });
        }

        debug!(%key, index, "test and set");
        Ok(state.write(Action::TestAndSet, key, value, expire_time, index))
    }

    async fn delete(&self, key: &str, index: u64) -> Result<Response> {
        let key = writable_key(key)?;
        let mut state = self.inner.lock().await;

        let removed = state
            .nodes
            .remove(&key)
            .ok_or_else(|| StoreError::KeyNotFound(key.clone()))?;
        state.current_index = state.current_index.max(index);

        debug!(%key, index, "delete");
        let response = Response {
            action: Action::Delete,
            key,
            prev_value: Some(removed.value),
            value: None,
            new_key: false,
            expiration: None,
            index,
        };
        state.hub.notify(response.clone());
        Ok(response)
    }

    async fn add_watcher(&self, key: &str, since_index: u64) -> Result<Watcher> {
        let key = normalize_key(key);
        self.inner.lock().await.hub.watch(&key, since_index)
    }

    async fn children(&self, prefix: &str) -> Vec<String> {
        let prefix = normalize_key(prefix);
        let dir = if prefix == "/" {
            prefix
        } else {
            format!("{}/", prefix)
        };
        let state = self.inner.lock().await;
        state
            .nodes
            .range(dir.clone()..)
            .take_while(|(k, _)| k.starts_with(&dir))
            .map(|(k, _)| k.clone())
            .collect()
    }

    async fn cancel_watcher(&self, key: &str, id: WatcherId) -> bool {
        let key = normalize_key(key);
        self.inner.lock().await.hub.cancel(&key, id)
    }

    async fn clear_watchers(&self) {
        let cleared = self.inner.lock().await.hub.clear();
        debug!(cleared, "cleared pending watchers");
    }
}
