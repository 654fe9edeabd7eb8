//! Single-shot watchers and the bounded event history they replay from.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::store::Response;

pub type WatcherId = u64;

/// What a watcher resolves with: a matching change, or the cancellation sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchNotification {
    Changed(Response),
    Cleared,
}

/// Handle returned by `KvStore::add_watcher`. Resolves exactly once.
#[derive(Debug)]
pub struct Watcher {
    key: String,
    id: WatcherId,
    rx: oneshot::Receiver<WatchNotification>,
}

impl Watcher {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Suspend until the store delivers a change or clears this watcher.
    /// A store dropped while the watcher is pending counts as cleared.
    pub async fn wait(self) -> WatchNotification {
        self.rx.await.unwrap_or(WatchNotification::Cleared)
    }
}

struct PendingWatcher {
    id: WatcherId,
    since_index: u64,
    tx: oneshot::Sender<WatchNotification>,
}

impl fmt::Debug for PendingWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWatcher")
            .field("id", &self.id)
            .field("since_index", &self.since_index)
            .finish()
    }
}

/// Ring of the most recent change events, oldest first.
#[derive(Debug)]
struct EventHistory {
    capacity: usize,
    events: VecDeque<Response>,
    /// Highest index pushed out of the ring, 0 while nothing was evicted.
    last_evicted: u64,
}

impl EventHistory {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
            last_evicted: 0,
        }
    }

    fn push(&mut self, event: Response) {
        if self.capacity == 0 {
            self.last_evicted = event.index;
            return;
        }
        if self.events.len() == self.capacity {
            if let Some(evicted) = self.events.pop_front() {
                self.last_evicted = evicted.index;
            }
        }
        self.events.push_back(event);
    }

    /// First retained event at or above `since_index` touching `key` or a descendant.
    fn scan(&self, key: &str, since_index: u64) -> Result<Option<Response>> {
        if since_index <= self.last_evicted {
            let oldest = self
                .events
                .front()
                .map(|e| e.index)
                .unwrap_or(self.last_evicted + 1);
            return Err(StoreError::EventIndexCleared {
                requested: since_index,
                oldest,
            });
        }
        Ok(self
            .events
            .iter()
            .find(|e| e.index >= since_index && is_under(&e.key, key))
            .cloned())
    }
}

fn is_under(event_key: &str, watched: &str) -> bool {
    watched == "/"
        || event_key == watched
        || (event_key.starts_with(watched) && event_key[watched.len()..].starts_with('/'))
}

/// `/a/b/c` -> `/a/b/c`, `/a/b`, `/a`, `/`.
fn ancestors(key: &str) -> Vec<String> {
    let mut paths = vec![key.to_string()];
    let mut current = key;
    while let Some(pos) = current.rfind('/') {
        current = &current[..pos];
        if current.is_empty() {
            break;
        }
        paths.push(current.to_string());
    }
    if key != "/" {
        paths.push("/".to_string());
    }
    paths
}

/// Pending watchers keyed by watched path, plus the replay history.
/// Owned by the store and only touched under its lock.
#[derive(Debug)]
pub(crate) struct WatcherHub {
    next_id: WatcherId,
    watchers: HashMap<String, Vec<PendingWatcher>>,
    history: EventHistory,
}

impl WatcherHub {
    pub(crate) fn new(history_capacity: usize) -> Self {
        Self {
            next_id: 1,
            watchers: HashMap::new(),
            history: EventHistory::new(history_capacity),
        }
    }

    pub(crate) fn watch(&mut self, key: &str, since_index: u64) -> Result<Watcher> {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();

        if since_index > 0 {
            if let Some(event) = self.history.scan(key, since_index)? {
                debug!(key, since_index, index = event.index, "watch resolved from history");
                let _ = tx.send(WatchNotification::Changed(event));
                return Ok(Watcher {
                    key: key.to_string(),
                    id,
                    rx,
                });
            }
        }

        let list = self.watchers.entry(key.to_string()).or_default();
        // Drop watchers whose handle went away without being resolved.
        list.retain(|w| !w.tx.is_closed());
        list.push(PendingWatcher {
            id,
            since_index,
            tx,
        });
        Ok(Watcher {
            key: key.to_string(),
            id,
            rx,
        })
    }

    /// Record `event` and resolve every watcher on its key or an ancestor whose
    /// `since_index` it satisfies.
    pub(crate) fn notify(&mut self, event: Response) {
        for path in ancestors(&event.key) {
            let Some(list) = self.watchers.get_mut(&path) else {
                continue;
            };
            let pending = std::mem::take(list);
            for watcher in pending {
                if watcher.tx.is_closed() {
                    continue;
                }
                if event.index >= watcher.since_index {
                    let _ = watcher.tx.send(WatchNotification::Changed(event.clone()));
                } else {
                    list.push(watcher);
                }
            }
            if list.is_empty() {
                self.watchers.remove(&path);
            }
        }
        self.history.push(event);
    }

    pub(crate) fn cancel(&mut self, key: &str, id: WatcherId) -> bool {
        let Some(list) = self.watchers.get_mut(key) else {
            return false;
        };
        let Some(pos) = list.iter().position(|w| w.id == id) else {
            return false;
        };
        let watcher = list.remove(pos);
        if list.is_empty() {
            self.watchers.remove(key);
        }
        let _ = watcher.tx.send(WatchNotification::Cleared);
        true
    }

    pub(crate) fn clear(&mut self) -> usize {
        let mut cleared = 0;
        for (_, list) in self.watchers.drain() {
            for watcher in list {
                if watcher.tx.send(WatchNotification::Cleared).is_ok() {
                    cleared += 1;
                }
            }
        }
        cleared
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.watchers.values().map(Vec::len).sum()
    }
}
