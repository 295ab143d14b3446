//! Current-session tracking and the persisted history.
//!
//! # Merge Rules
//!
//! - Same `session_id`: incoming non-empty values win, except that an existing
//!   `created_at` is never replaced.
//! - Different `session_id`: the old session is stamped `completed` and moved
//!   to history *before* the new one becomes current.
//! - Updates without any session id apply to the current session, or are
//!   ignored when there is none.
//!
//! # Persistence
//!
//! Every history mutation is written straight to `mcp-session-history` as
//! `{ sessions, lastCleanup }`. Loading is defensive: a missing, empty or
//! corrupt value yields an empty history, and individual unreadable entries
//! are skipped.

use std::sync::Arc;

use feedback_protocol::StatusInfo;
use serde_json::Value;

use super::export::{HistoryExport, SingleSessionExport};
use super::types::{FeedbackSession, SessionHistoryEntry, SessionStats, SessionUpdate, StoredHistory};
use crate::kv::{self, KeyValueStore, SESSION_HISTORY_KEY};
use crate::settings::effective_retention_hours;
use crate::status::SessionStatus;
use crate::time::{millis_to_secs, normalize_timestamp, today_start_secs};

pub const MAX_HISTORY: usize = 10;
/// Duration assumed for a retired session whose start time is unknown.
pub const FALLBACK_DURATION_SECS: f64 = 300.0;

type SessionListener = Box<dyn FnMut(Option<&FeedbackSession>) + Send>;
type HistoryListener = Box<dyn FnMut(&[SessionHistoryEntry]) + Send>;
type StatsListener = Box<dyn FnMut(&SessionStats) + Send>;

#[derive(Default)]
struct Listeners {
    session: Option<SessionListener>,
    history: Option<HistoryListener>,
    stats: Option<StatsListener>,
}

pub struct SessionDataManager {
    store: Arc<dyn KeyValueStore>,
    retention_hours: u32,
    current: Option<FeedbackSession>,
    history: Vec<SessionHistoryEntry>,
    last_status: Option<StatusInfo>,
    stats: SessionStats,
    now_ms: i64,
    listeners: Listeners,
}

impl SessionDataManager {
    /// Loads history, drops expired entries and computes stats. A retention of
    /// zero selects the default window.
    pub fn new(store: Arc<dyn KeyValueStore>, retention_hours: u32, now: i64) -> Self {
        let history = load_history(store.as_ref());
        let mut manager = Self {
            store,
            retention_hours: effective_retention_hours(retention_hours),
            current: None,
            history,
            last_status: None,
            stats: SessionStats::default(),
            now_ms: now,
            listeners: Listeners::default(),
        };
        manager.cleanup_expired_sessions(now);
        manager.update_stats();
        manager
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn current(&self) -> Option<&FeedbackSession> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[SessionHistoryEntry] {
        &self.history
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn retention_hours(&self) -> u32 {
        self.retention_hours
    }

    pub fn last_status(&self) -> Option<&StatusInfo> {
        self.last_status.as_ref()
    }

    /// Current session first, then history.
    pub fn find_session_by_id(&self, session_id: &str) -> Option<&FeedbackSession> {
        self.current
            .as_ref()
            .filter(|session| session.session_id == session_id)
            .or_else(|| {
                self.history
                    .iter()
                    .map(|entry| &entry.session)
                    .find(|session| session.session_id == session_id)
            })
    }

    pub fn set_session_listener(
        &mut self,
        listener: impl FnMut(Option<&FeedbackSession>) + Send + 'static,
    ) {
        self.listeners.session = Some(Box::new(listener));
    }

    pub fn set_history_listener(
        &mut self,
        listener: impl FnMut(&[SessionHistoryEntry]) + Send + 'static,
    ) {
        self.listeners.history = Some(Box::new(listener));
    }

    pub fn set_stats_listener(&mut self, listener: impl FnMut(&SessionStats) + Send + 'static) {
        self.listeners.stats = Some(Box::new(listener));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Current session
    // ─────────────────────────────────────────────────────────────────────────────

    /// Merges or replaces the current session and returns it.
    pub fn update_current_session(
        &mut self,
        update: SessionUpdate,
        now: i64,
    ) -> Option<&FeedbackSession> {
        self.now_ms = now;
        let update = update.cleaned();

        let same_session = match (&update.session_id, &self.current) {
            (None, Some(_)) => true,
            (None, None) => {
                tracing::debug!("Ignoring session update without an id");
                return None;
            }
            (Some(id), Some(current)) => current.session_id == *id,
            (Some(_), None) => false,
        };

        if same_session {
            if let Some(current) = self.current.as_mut() {
                merge_into(current, &update);
                tracing::debug!(session_id = %current.session_id, "Session merged");
            }
        } else {
            if let Some(old) = self.current.take() {
                let retired = retire(old, now);
                tracing::info!(session_id = %retired.session_id, "Session replaced, moving to history");
                self.add_session_to_history(retired, now);
            }
            let session = self.normalize(update, now);
            tracing::info!(session_id = %session.session_id, "New current session");
            self.current = Some(session);
        }

        self.notify_session();
        self.current.as_ref()
    }

    /// Records a status push and folds it into the current session.
    pub fn update_status_info(&mut self, status_info: &StatusInfo, now: i64) {
        self.now_ms = now;
        self.last_status = Some(status_info.clone());

        if status_info.session_id.is_none() && status_info.created_at.is_none() {
            return;
        }

        let mut update = SessionUpdate::from(status_info).cleaned();
        if let Some(current) = &self.current {
            if update.session_id.is_none() {
                update.session_id = Some(current.session_id.clone());
            }
            if update.project_directory.is_none() {
                update.project_directory = current.project_directory.clone();
            }
            if update.summary.is_none() {
                update.summary = current.summary.clone();
            }
        }

        if update.status.map(|s| s.is_completed()).unwrap_or(false) {
            self.handle_session_completed(update, now);
        } else {
            self.update_current_session(update, now);
        }
    }

    /// A session reached a completed status: store it in history and, if it is
    /// the current one, keep the reference but mark it completed.
    pub fn handle_session_completed(&mut self, update: SessionUpdate, now: i64) {
        self.now_ms = now;
        let update = update.cleaned();
        let Some(session_id) = update.session_id.clone() else {
            tracing::debug!("Ignoring completion without a session id");
            return;
        };

        let is_current = self
            .current
            .as_ref()
            .map(|current| current.session_id == session_id)
            .unwrap_or(false);

        let mut session = match (&self.current, is_current) {
            (Some(current), true) => {
                let mut merged = current.clone();
                merge_into(&mut merged, &update);
                merged
            }
            _ => self.normalize(update.clone(), now),
        };

        let completed_at = update.completed_at.unwrap_or_else(|| millis_to_secs(now));
        // A duration already reported by the server is kept even though
        // `completed_at` moves.
        session.completed_at = Some(completed_at);
        if session.duration.is_none() && session.has_created_at() {
            session.duration = Some((completed_at - session.created_at).max(0.0));
        }

        tracing::info!(session_id = %session_id, status = %session.status, "Session completed");
        self.add_session_to_history(session.clone(), now);

        if is_current {
            self.current = Some(session);
            self.notify_session();
        }
    }

    pub fn clear_current_session(&mut self) {
        self.current = None;
        self.notify_session();
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────────

    /// Admits a completed session, replacing an entry with the same id in
    /// place or prepending. Returns false for non-completed sessions.
    pub fn add_session_to_history(&mut self, session: FeedbackSession, now: i64) -> bool {
        if !session.status.is_completed() {
            tracing::debug!(
                session_id = %session.session_id,
                status = %session.status,
                "Not adding unfinished session to history"
            );
            return false;
        }

        let entry = SessionHistoryEntry {
            session,
            saved_at: now,
        };

        match self
            .history
            .iter()
            .position(|existing| existing.session.session_id == entry.session.session_id)
        {
            Some(index) => self.history[index] = entry,
            None => self.history.insert(0, entry),
        }
        self.history.truncate(MAX_HISTORY);

        self.persist(now);
        self.history_changed();
        true
    }

    /// Drops entries older than the retention window. Persists only when
    /// something was removed.
    pub fn cleanup_expired_sessions(&mut self, now: i64) -> usize {
        self.now_ms = now;
        let retention_ms = self.retention_ms();
        let before = self.history.len();
        self.history
            .retain(|entry| now - entry.reference_time_ms() <= retention_ms);

        let removed = before - self.history.len();
        if removed > 0 {
            tracing::info!(removed, retention_hours = self.retention_hours, "Expired sessions removed");
            self.persist(now);
            self.history_changed();
        }
        removed
    }

    /// Changes the retention window and re-applies it.
    pub fn set_retention_hours(&mut self, hours: u32, now: i64) -> usize {
        let hours = effective_retention_hours(hours);
        if hours == self.retention_hours {
            return 0;
        }
        self.retention_hours = hours;
        self.cleanup_expired_sessions(now)
    }

    pub fn is_session_expired(&self, entry: &SessionHistoryEntry, now: i64) -> bool {
        now - entry.reference_time_ms() > self.retention_ms()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        if let Err(err) = self.store.remove(SESSION_HISTORY_KEY) {
            tracing::warn!(error = %err, "Failed to clear stored session history");
        }
        self.history_changed();
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn export_session_history(&self, now: i64) -> HistoryExport {
        HistoryExport::new(&self.history, now)
    }

    /// Only sessions in history can be exported individually.
    pub fn export_single_session(&self, session_id: &str, now: i64) -> Option<SingleSessionExport> {
        self.history
            .iter()
            .find(|entry| entry.session.session_id == session_id)
            .map(|entry| SingleSessionExport::new(entry, now))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────────

    fn retention_ms(&self) -> i64 {
        i64::from(self.retention_hours) * 60 * 60 * 1000
    }

    fn normalize(&self, update: SessionUpdate, now: i64) -> FeedbackSession {
        let created_at = update
            .created_at
            .or_else(|| {
                self.last_status
                    .as_ref()
                    .and_then(|status| status.created_at)
                    .filter(|v| *v > 0.0)
            })
            .map(normalize_timestamp)
            .unwrap_or_else(|| millis_to_secs(now));

        FeedbackSession {
            session_id: update.session_id.unwrap_or_default(),
            status: update.status.unwrap_or_default(),
            created_at,
            completed_at: update.completed_at,
            duration: update.duration,
            project_directory: update.project_directory,
            summary: update.summary,
        }
    }

    fn persist(&self, now: i64) {
        let stored = StoredHistory {
            sessions: self.history.clone(),
            last_cleanup: now,
        };
        if let Err(err) = kv::write_json(self.store.as_ref(), SESSION_HISTORY_KEY, &stored) {
            tracing::warn!(error = %err, "Failed to persist session history");
        }
    }

    fn history_changed(&mut self) {
        if let Some(listener) = self.listeners.history.as_mut() {
            listener(&self.history);
        }
        self.update_stats();
    }

    fn update_stats(&mut self) {
        let today_start = today_start_secs(self.now_ms);
        let today_count = self
            .history
            .iter()
            .filter(|entry| {
                entry.session.has_created_at()
                    && normalize_timestamp(entry.session.created_at) >= today_start
            })
            .count();

        let durations: Vec<f64> = self
            .history
            .iter()
            .filter_map(|entry| entry.session.duration)
            .filter(|duration| *duration > 0.0)
            .collect();
        let average_duration = if durations.is_empty() {
            0
        } else {
            (durations.iter().sum::<f64>() / durations.len() as f64).round() as u64
        };

        self.stats = SessionStats {
            today_count,
            average_duration,
            total_sessions: self.history.len(),
        };
        if let Some(listener) = self.listeners.stats.as_mut() {
            listener(&self.stats);
        }
    }

    fn notify_session(&mut self) {
        if let Some(listener) = self.listeners.session.as_mut() {
            listener(self.current.as_ref());
        }
    }
}

fn merge_into(existing: &mut FeedbackSession, update: &SessionUpdate) {
    if let Some(status) = update.status {
        existing.status = status;
    }
    if !existing.has_created_at() {
        if let Some(created_at) = update.created_at {
            existing.created_at = created_at;
        }
    }
    if update.completed_at.is_some() {
        existing.completed_at = update.completed_at;
    }
    if update.duration.is_some() {
        existing.duration = update.duration;
    }
    if update.project_directory.is_some() {
        existing.project_directory = update.project_directory.clone();
    }
    if update.summary.is_some() {
        existing.summary = update.summary.clone();
    }
}

/// Stamps a session that ended because another one replaced it.
fn retire(mut session: FeedbackSession, now: i64) -> FeedbackSession {
    let completed_at = millis_to_secs(now);
    if !session.has_created_at() {
        session.created_at = completed_at - FALLBACK_DURATION_SECS;
    }
    session.status = SessionStatus::Completed;
    // Same as the completion path: an existing duration is not recomputed.
    session.completed_at = Some(completed_at);
    if session.duration.is_none() {
        session.duration = Some((completed_at - session.created_at).max(0.0));
    }
    session
}

fn load_history(store: &dyn KeyValueStore) -> Vec<SessionHistoryEntry> {
    let raw = match store.get(SESSION_HISTORY_KEY) {
        Ok(Some(raw)) if !raw.trim().is_empty() => raw,
        Ok(_) => return Vec::new(),
        Err(err) => {
            tracing::warn!(error = %err, "Session history unavailable, starting empty");
            return Vec::new();
        }
    };

    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "Session history corrupt, starting empty");
            return Vec::new();
        }
    };

    let Some(sessions) = value.get("sessions").and_then(Value::as_array) else {
        tracing::warn!("Session history has no sessions array, starting empty");
        return Vec::new();
    };

    let mut history: Vec<SessionHistoryEntry> = sessions
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping unreadable history entry");
                None
            }
        })
        .collect();
    history.truncate(MAX_HISTORY);
    history
}
