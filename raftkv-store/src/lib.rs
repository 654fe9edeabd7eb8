//! `raftkv-store` — the store engine consumed by the replicated command layer.
//!
//! Exposes the [`KvStore`] contract, the change descriptor returned by every
//! operation, the single-shot [`Watcher`] handle and an in-memory engine used by
//! nodes and tests alike.

mod errors;
pub use errors::{Result, StoreError};

mod store;
pub use store::{is_permanent, normalize_key, permanent, Action, KvStore, Node, Response};

mod watch;
pub use watch::{WatchNotification, Watcher, WatcherId};

mod memory_store;
pub use memory_store::{MemoryStore, DEFAULT_HISTORY_CAPACITY};
