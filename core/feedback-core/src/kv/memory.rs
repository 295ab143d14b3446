use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{deliver, KeyValueStore, Subscription};
use crate::error::{ClientError, Result};

struct Subscriber {
    origin: u64,
    key: String,
    tx: mpsc::Sender<super::StorageChange>,
}

#[derive(Default)]
struct Shared {
    values: HashMap<String, String>,
    subscribers: Vec<Subscriber>,
    next_origin: u64,
    failing: bool,
    quota_bytes: Option<usize>,
}

impl Shared {
    fn notify(&mut self, writer: u64, key: &str, value: Option<&str>) {
        self.subscribers.retain(|sub| {
            if sub.origin == writer || sub.key != key {
                return true;
            }
            deliver(&sub.tx, key, value)
        });
    }

    fn used_bytes_with(&self, key: &str, value: &str) -> usize {
        self.values
            .iter()
            .filter(|(existing, _)| existing.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum::<usize>()
            + key.len()
            + value.len()
    }
}

/// In-process shared store. Each handle is one "tab"; clones share the
/// handle's identity, [`fork`](MemoryStore::fork) creates a new peer.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    origin: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let shared = Shared {
            next_origin: 1,
            ..Shared::default()
        };
        Self {
            shared: Arc::new(Mutex::new(shared)),
            origin: 0,
        }
    }

    /// A handle onto the same data with a distinct writer identity.
    pub fn fork(&self) -> Self {
        let mut shared = self.lock();
        let origin = shared.next_origin;
        shared.next_origin += 1;
        Self {
            shared: Arc::clone(&self.shared),
            origin,
        }
    }

    /// Makes every operation fail, as a disabled browser storage would.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Caps total stored bytes (keys + values) to simulate quota errors.
    pub fn set_quota(&self, quota_bytes: Option<usize>) {
        self.lock().quota_bytes = quota_bytes;
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let shared = self.lock();
        if shared.failing {
            return Err(ClientError::StorageUnavailable("memory store disabled".to_string()));
        }
        Ok(shared.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut shared = self.lock();
        if shared.failing {
            return Err(ClientError::StorageUnavailable("memory store disabled".to_string()));
        }
        if let Some(quota) = shared.quota_bytes {
            if shared.used_bytes_with(key, value) > quota {
                return Err(ClientError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        shared.values.insert(key.to_string(), value.to_string());
        shared.notify(self.origin, key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut shared = self.lock();
        if shared.failing {
            return Err(ClientError::StorageUnavailable("memory store disabled".to_string()));
        }
        if shared.values.remove(key).is_some() {
            shared.notify(self.origin, key, None);
        }
        Ok(())
    }

    fn subscribe(&self, key: &str) -> Subscription {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(Subscriber {
            origin: self.origin,
            key: key.to_string(),
            tx,
        });
        Subscription::new(key, rx)
    }
}
