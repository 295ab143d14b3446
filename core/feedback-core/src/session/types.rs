use feedback_protocol::{SessionInfo, StatusInfo};
use serde::{Deserialize, Serialize};

use crate::status::SessionStatus;
use crate::time::{normalize_timestamp, to_millis};

/// One feedback-request lifecycle. Timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSession {
    pub session_id: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub created_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<f64>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_directory: Option<String>,
    #[serde(default, alias = "ai_summary", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl FeedbackSession {
    pub fn has_created_at(&self) -> bool {
        self.created_at > 0.0
    }
}

/// A partial session record from a server push. Absent and empty values never
/// overwrite what is already known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub session_id: Option<String>,
    pub status: Option<SessionStatus>,
    /// Seconds or milliseconds since the epoch.
    pub created_at: Option<f64>,
    pub completed_at: Option<f64>,
    pub duration: Option<f64>,
    pub project_directory: Option<String>,
    pub summary: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

impl SessionUpdate {
    pub fn with_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    /// Drops empty strings and non-positive timestamps so the merge only sees
    /// real values.
    pub fn cleaned(self) -> Self {
        Self {
            session_id: non_empty(self.session_id.as_deref()),
            status: self.status,
            created_at: positive(self.created_at).map(normalize_timestamp),
            completed_at: positive(self.completed_at).map(normalize_timestamp),
            duration: self.duration.filter(|v| v.is_finite() && *v >= 0.0),
            project_directory: non_empty(self.project_directory.as_deref()),
            summary: non_empty(self.summary.as_deref()),
        }
    }
}

impl From<&SessionInfo> for SessionUpdate {
    fn from(info: &SessionInfo) -> Self {
        Self {
            session_id: Some(info.session_id.clone()),
            created_at: info.created_at,
            project_directory: info.project_directory.clone(),
            summary: info.summary.clone(),
            ..Self::default()
        }
    }
}

impl From<&StatusInfo> for SessionUpdate {
    fn from(info: &StatusInfo) -> Self {
        Self {
            session_id: info.session_id.clone(),
            status: info.status.as_deref().and_then(SessionStatus::parse),
            created_at: info.created_at,
            project_directory: info.project_directory.clone(),
            summary: info.summary.clone(),
            ..Self::default()
        }
    }
}

/// A finished session as stored in history. `saved_at` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistoryEntry {
    #[serde(flatten)]
    pub session: FeedbackSession,
    #[serde(default)]
    pub saved_at: i64,
}

impl SessionHistoryEntry {
    /// Most recent of `saved_at`, `completed_at` and `created_at`, in ms.
    pub fn reference_time_ms(&self) -> i64 {
        let completed = self.session.completed_at.map(to_millis).unwrap_or(0);
        let created = if self.session.has_created_at() {
            to_millis(self.session.created_at)
        } else {
            0
        };
        self.saved_at.max(completed).max(created)
    }
}

/// Persisted shape of the history key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredHistory {
    #[serde(default)]
    pub sessions: Vec<SessionHistoryEntry>,
    #[serde(rename = "lastCleanup", default)]
    pub last_cleanup: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub today_count: usize,
    /// Rounded mean of positive durations, in seconds.
    pub average_duration: u64,
    pub total_sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cleaned_drops_empty_values_and_scales_millis() {
        let update = SessionUpdate {
            session_id: Some("  ".to_string()),
            created_at: Some(1_700_000_000_000.0),
            summary: Some(String::new()),
            ..SessionUpdate::default()
        }
        .cleaned();

        assert!(update.session_id.is_none());
        assert!(update.summary.is_none());
        assert_eq!(update.created_at, Some(1_700_000_000.0));
    }

    #[test]
    fn history_entry_flattens_session_fields() {
        let entry = SessionHistoryEntry {
            session: FeedbackSession {
                session_id: "abc".to_string(),
                status: SessionStatus::Completed,
                created_at: 100.0,
                completed_at: Some(160.0),
                duration: Some(60.0),
                project_directory: None,
                summary: Some("done".to_string()),
            },
            saved_at: 170_000,
        };

        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["session_id"], json!("abc"));
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["saved_at"], json!(170_000));
        assert!(value.get("project_directory").is_none());
    }

    #[test]
    fn reference_time_takes_latest_in_millis() {
        let entry = SessionHistoryEntry {
            session: FeedbackSession {
                session_id: "abc".to_string(),
                status: SessionStatus::Completed,
                created_at: 100.0,
                completed_at: Some(500.0),
                duration: None,
                project_directory: None,
                summary: None,
            },
            saved_at: 200_000,
        };
        assert_eq!(entry.reference_time_ms(), 500_000);
    }

    #[test]
    fn ai_summary_alias_is_accepted() {
        let session: FeedbackSession = serde_json::from_value(json!({
            "session_id": "x",
            "ai_summary": "legacy"
        }))
        .expect("parse");
        assert_eq!(session.summary.as_deref(), Some("legacy"));
        assert_eq!(session.status, SessionStatus::Waiting);
    }
}
