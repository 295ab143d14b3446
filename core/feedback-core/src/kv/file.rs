//! File-backed key-value store shared between processes.
//!
//! Each key lives in `<dir>/<key>.json`. Writers replace the whole file via
//! temp file + rename so readers never see a partial value. There is no
//! filesystem watcher: [`poll`](KeyValueStore::poll) re-reads every subscribed
//! key and reports values that differ from what this handle last saw.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;

use super::{deliver, KeyValueStore, StorageChange, Subscription};
use crate::error::{ClientError, Result};

struct Watch {
    key: String,
    last_seen: Option<String>,
    tx: mpsc::Sender<StorageChange>,
}

pub struct FileStore {
    dir: PathBuf,
    watches: Mutex<Vec<Watch>>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            watches: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }

    fn read_raw(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs_err::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ClientError::io(format!("read {}", key), err)),
        }
    }

    fn watches(&self) -> MutexGuard<'_, Vec<Watch>> {
        self.watches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Own writes are not changes from this handle's point of view.
    fn mark_seen(&self, key: &str, value: Option<&str>) {
        for watch in self.watches().iter_mut().filter(|w| w.key == key) {
            watch.last_seen = value.map(str::to_string);
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.read_raw(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs_err::create_dir_all(&self.dir)
            .map_err(|err| ClientError::io("create store directory", err))?;

        let mut temp_file = NamedTempFile::new_in(&self.dir)
            .map_err(|err| ClientError::io(format!("temp file for {}", key), err))?;
        temp_file
            .write_all(value.as_bytes())
            .map_err(|err| ClientError::io(format!("write {}", key), err))?;
        temp_file
            .flush()
            .map_err(|err| ClientError::io(format!("flush {}", key), err))?;
        temp_file
            .persist(self.path_for(key))
            .map_err(|err| ClientError::io(format!("persist {}", key), err.error))?;

        self.mark_seen(key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs_err::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(ClientError::io(format!("remove {}", key), err)),
        }
        self.mark_seen(key, None);
        Ok(())
    }

    fn subscribe(&self, key: &str) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let last_seen = self.read_raw(key).unwrap_or_else(|err| {
            tracing::warn!(key, error = %err, "Could not read initial value for subscription");
            None
        });
        self.watches().push(Watch {
            key: key.to_string(),
            last_seen,
            tx,
        });
        Subscription::new(key, rx)
    }

    fn poll(&self) {
        let keys: Vec<String> = {
            let watches = self.watches();
            let mut keys: Vec<String> = watches.iter().map(|w| w.key.clone()).collect();
            keys.sort();
            keys.dedup();
            keys
        };

        for key in keys {
            let current = match self.read_raw(&key) {
                Ok(value) => value,
                Err(err) => {
                    tracing::debug!(key = %key, error = %err, "Skipping unreadable key during poll");
                    continue;
                }
            };

            self.watches().retain_mut(|watch| {
                if watch.key != key || watch.last_seen == current {
                    return true;
                }
                watch.last_seen = current.clone();
                deliver(&watch.tx, &key, current.as_deref())
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_as_none() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(temp_dir.path());
        assert!(store.get("absent").expect("get").is_none());
    }

    #[test]
    fn set_then_get_across_handles() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let first = FileStore::new(temp_dir.path());
        let second = FileStore::new(temp_dir.path());

        first.set("mcp-feedback-tabs", "{}").expect("set");
        assert_eq!(
            second.get("mcp-feedback-tabs").expect("get").as_deref(),
            Some("{}")
        );
        assert!(temp_dir.path().join("mcp-feedback-tabs.json").exists());
    }

    #[test]
    fn poll_reports_external_writes_only() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let first = FileStore::new(temp_dir.path());
        let second = FileStore::new(temp_dir.path());
        let own = first.subscribe("k");
        let peer = second.subscribe("k");

        first.set("k", "v1").expect("set");
        first.poll();
        second.poll();

        assert!(own.drain().is_empty());
        let changes = peer.drain();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_value.as_deref(), Some("v1"));

        second.poll();
        assert!(peer.drain().is_empty());
    }

    #[test]
    fn poll_reports_removal() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let first = FileStore::new(temp_dir.path());
        let second = FileStore::new(temp_dir.path());
        first.set("k", "v1").expect("set");
        let peer = second.subscribe("k");

        first.remove("k").expect("remove");
        second.poll();

        let changes = peer.drain();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].new_value.is_none());
    }

    #[test]
    fn remove_missing_key_is_ok() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(temp_dir.path());
        assert!(store.remove("never-written").is_ok());
    }

    #[test]
    fn keys_are_sanitized_into_file_names() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(temp_dir.path());
        store.set("a/b c", "x").expect("set");
        assert!(temp_dir.path().join("a_b_c.json").exists());
    }
}
