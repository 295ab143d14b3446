//! Multi-tab liveness coordination through the shared key-value store.
//!
//! Every running client registers a [`TabRecord`] in one shared table and
//! refreshes its timestamp on a heartbeat. Records that stop refreshing are
//! expired by whichever tab reads the table next. There is no lock: the table
//! is read-modify-written as a whole and concurrent updates may be lost, which
//! the next heartbeat repairs.
//!
//! Storage failures never escape. A coordinator that cannot read or write the
//! table behaves as the only tab.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::api::ServerApi;
use crate::config::TabsConfig;
use crate::error::{ClientError, Result};
use crate::kv::{self, KeyValueStore, Subscription, LAST_ACTIVITY_KEY, TABS_KEY};
use crate::timer::IntervalTimer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub tab_id: String,
    /// Epoch milliseconds of the last heartbeat.
    pub timestamp: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TabRecord {
    pub fn is_expired(&self, now: i64, expiry_ms: i64) -> bool {
        now - self.timestamp > expiry_ms
    }
}

pub type TabTable = BTreeMap<String, TabRecord>;

type TabListener = Box<dyn FnMut(&[TabRecord]) + Send>;

pub struct TabCoordinator {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn ServerApi>,
    url: String,
    expiry_ms: i64,
    heartbeat: IntervalTimer,
    tab_id: Option<String>,
    subscription: Option<Subscription>,
    listener: Option<TabListener>,
}

fn make_tab_id(now: i64) -> String {
    let mut random = rand::thread_rng();
    format!("tab_{}_{:08x}", now, random.next_u32())
}

impl TabCoordinator {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn ServerApi>,
        url: impl Into<String>,
        config: &TabsConfig,
    ) -> Self {
        Self {
            store,
            api,
            url: url.into(),
            expiry_ms: config.expiry_ms,
            heartbeat: IntervalTimer::new(config.heartbeat_ms),
            tab_id: None,
            subscription: None,
            listener: None,
        }
    }

    pub fn tab_id(&self) -> Option<&str> {
        self.tab_id.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.tab_id.is_some()
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.heartbeat.next_deadline()
    }

    /// Invoked with the current active tabs whenever another writer changes
    /// the table.
    pub fn set_change_listener(&mut self, listener: impl FnMut(&[TabRecord]) + Send + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Registers this instance. Calling it again while running returns the
    /// existing id.
    pub fn start(&mut self, now: i64) -> String {
        if let Some(id) = &self.tab_id {
            return id.clone();
        }

        let tab_id = make_tab_id(now);
        self.tab_id = Some(tab_id.clone());
        self.subscription = Some(self.store.subscribe(TABS_KEY));

        if let Err(err) = self.write_own_record(&tab_id, now) {
            tracing::warn!(tab_id = %tab_id, error = %err, "Failed to register tab in shared store");
        }
        self.heartbeat.start(now);

        let api = Arc::clone(&self.api);
        let register_id = tab_id.clone();
        thread::spawn(move || {
            if let Err(err) = api.register_tab(&register_id) {
                tracing::warn!(tab_id = %register_id, error = %err, "Tab registration with server failed");
            } else {
                tracing::debug!(tab_id = %register_id, "Tab registered with server");
            }
        });

        tracing::info!(tab_id = %tab_id, "Tab started");
        tab_id
    }

    /// Removes the own record and cancels the heartbeat. Idempotent.
    pub fn stop(&mut self) {
        self.heartbeat.cancel();
        self.subscription = None;
        let Some(tab_id) = self.tab_id.take() else {
            return;
        };

        let result = self.read_table().and_then(|mut table| {
            table.remove(&tab_id);
            kv::write_json(self.store.as_ref(), TABS_KEY, &table)
        });
        match result {
            Ok(()) => tracing::info!(tab_id = %tab_id, "Tab stopped"),
            Err(err) => {
                tracing::warn!(tab_id = %tab_id, error = %err, "Failed to remove tab record")
            }
        }
    }

    /// Fires the heartbeat when due. Returns true if a refresh was written.
    pub fn on_tick(&mut self, now: i64) -> bool {
        if !self.heartbeat.poll(now) {
            return false;
        }
        let Some(tab_id) = self.tab_id.clone() else {
            return false;
        };

        match self.write_own_record(&tab_id, now) {
            Ok(()) => {
                tracing::debug!(tab_id = %tab_id, "Tab heartbeat");
                true
            }
            Err(err) => {
                tracing::warn!(tab_id = %tab_id, error = %err, "Tab heartbeat write failed");
                false
            }
        }
    }

    /// Live tabs after sweeping expired records. The swept table is written
    /// back only when something was removed.
    pub fn list_active_tabs(&self, now: i64) -> Vec<TabRecord> {
        match self.sweep(now) {
            Ok(table) => table.into_values().collect(),
            Err(err) => {
                tracing::warn!(error = %err, "Tab table unreadable, assuming single tab");
                self.own_record(now).into_iter().collect()
            }
        }
    }

    /// True when the only active entry is this tab.
    pub fn is_sole_active_tab(&self, now: i64) -> bool {
        let Some(tab_id) = self.tab_id.as_deref() else {
            return false;
        };
        let active: Vec<TabRecord> = self
            .list_active_tabs(now)
            .into_iter()
            .filter(|record| record.active)
            .collect();
        active.len() == 1 && active[0].tab_id == tab_id
    }

    /// Drains change notifications and calls the listener once if any arrived.
    /// Returns whether the table changed.
    pub fn poll_changes(&mut self, now: i64) -> bool {
        let changed = match &self.subscription {
            Some(subscription) => !subscription.drain().is_empty(),
            None => false,
        };
        if !changed {
            return false;
        }

        let tabs = self.list_active_tabs(now);
        tracing::debug!(count = tabs.len(), "Tab table changed by another writer");
        if let Some(listener) = self.listener.as_mut() {
            listener(&tabs);
        }
        true
    }

    fn own_record(&self, now: i64) -> Option<TabRecord> {
        self.tab_id.as_ref().map(|id| TabRecord {
            tab_id: id.clone(),
            timestamp: now,
            url: self.url.clone(),
            active: true,
        })
    }

    fn read_table(&self) -> Result<TabTable> {
        match kv::read_json::<TabTable>(self.store.as_ref(), TABS_KEY) {
            Ok(table) => Ok(table.unwrap_or_default()),
            // Corrupt JSON is replaced on the next write; unavailable storage is not.
            Err(err @ ClientError::Json { .. }) => {
                tracing::warn!(error = %err, "Discarding corrupt tab table");
                Ok(TabTable::new())
            }
            Err(err) => Err(err),
        }
    }

    fn sweep(&self, now: i64) -> Result<TabTable> {
        let mut table = self.read_table()?;
        let before = table.len();
        table.retain(|_, record| !record.is_expired(now, self.expiry_ms));

        let removed = before - table.len();
        if removed > 0 {
            tracing::debug!(removed, "Expired tab records swept");
            kv::write_json(self.store.as_ref(), TABS_KEY, &table)?;
        }
        Ok(table)
    }

    fn write_own_record(&self, tab_id: &str, now: i64) -> Result<()> {
        let mut table = self.read_table()?;
        table.retain(|_, record| !record.is_expired(now, self.expiry_ms));
        table.insert(
            tab_id.to_string(),
            TabRecord {
                tab_id: tab_id.to_string(),
                timestamp: now,
                url: self.url.clone(),
                active: true,
            },
        );
        kv::write_json(self.store.as_ref(), TABS_KEY, &table)?;
        self.store.set(LAST_ACTIVITY_KEY, &now.to_string())
    }
}

impl Drop for TabCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}
