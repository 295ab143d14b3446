//! Shared key-value storage used as the only inter-tab medium.
//!
//! Every tab holds a handle to the same logical store. Writes are whole-value
//! overwrites with no locking across tabs; a change made through one handle is
//! announced to subscribers on *other* handles (at least once, unordered),
//! never to the writer itself.
//!
//! - [`MemoryStore`]: in-process map, `fork()` yields a peer tab handle.
//! - [`FileStore`]: one JSON file per key in a shared directory; external
//!   writes surface when the owner calls [`KeyValueStore::poll`].

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::mpsc::{Receiver, Sender};

use crate::error::{ClientError, Result};

/// Tab id → TabRecord mapping.
pub const TABS_KEY: &str = "mcp-feedback-tabs";
/// Epoch milliseconds of the last tab heartbeat from any tab.
pub const LAST_ACTIVITY_KEY: &str = "mcp-feedback-last-activity";
/// `{ sessions, lastCleanup }` owned by the session data manager.
pub const SESSION_HISTORY_KEY: &str = "mcp-session-history";

/// A change observed on a subscribed key. `None` means the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<String>,
}

/// Receiving end of a key subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    key: String,
    rx: Receiver<StorageChange>,
}

impl Subscription {
    pub(crate) fn new(key: &str, rx: Receiver<StorageChange>) -> Self {
        Self {
            key: key.to_string(),
            rx,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns every change delivered since the last drain.
    pub fn drain(&self) -> Vec<StorageChange> {
        self.rx.try_iter().collect()
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn subscribe(&self, key: &str) -> Subscription;

    /// Detects changes made outside this handle. Stores that push changes
    /// eagerly leave this as a no-op.
    fn poll(&self) {}
}

/// Reads and decodes a JSON value. Absent keys yield `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| ClientError::json(format!("decode {}", key), err)),
        None => Ok(None),
    }
}

pub fn write_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw =
        serde_json::to_string(value).map_err(|err| ClientError::json(format!("encode {}", key), err))?;
    store.set(key, &raw)
}

/// Sends a change, reporting whether the receiver is still alive.
pub(crate) fn deliver(tx: &Sender<StorageChange>, key: &str, value: Option<&str>) -> bool {
    tx.send(StorageChange {
        key: key.to_string(),
        new_value: value.map(str::to_string),
    })
    .is_ok()
}
