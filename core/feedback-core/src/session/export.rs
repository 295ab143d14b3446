//! Export snapshots of the session history.
//!
//! The JSON shape is what the web UI downloads, so files written here can be
//! read back by either side.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::SessionHistoryEntry;
use crate::error::{ClientError, Result};
use crate::status::SessionStatus;
use crate::time::{format_date, format_rfc3339};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSession {
    pub session_id: String,
    pub created_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    pub saved_at: i64,
}

impl From<&SessionHistoryEntry> for ExportedSession {
    fn from(entry: &SessionHistoryEntry) -> Self {
        let session = &entry.session;
        Self {
            session_id: session.session_id.clone(),
            created_at: session.created_at,
            completed_at: session.completed_at,
            duration: session.duration,
            status: session.status,
            project_directory: session.project_directory.clone(),
            ai_summary: session.summary.clone(),
            saved_at: entry.saved_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExport {
    pub exported_at: String,
    pub total_sessions: usize,
    pub sessions: Vec<ExportedSession>,
}

impl HistoryExport {
    pub fn new(history: &[SessionHistoryEntry], now_ms: i64) -> Self {
        Self {
            exported_at: format_rfc3339(now_ms),
            total_sessions: history.len(),
            sessions: history.iter().map(ExportedSession::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleSessionExport {
    pub exported_at: String,
    pub session: ExportedSession,
}

impl SingleSessionExport {
    pub fn new(entry: &SessionHistoryEntry, now_ms: i64) -> Self {
        Self {
            exported_at: format_rfc3339(now_ms),
            session: ExportedSession::from(entry),
        }
    }
}

/// `session-history-YYYY-MM-DD.json`
pub fn history_export_filename(now_ms: i64) -> String {
    format!("session-history-{}.json", format_date(now_ms))
}

/// `session-<first 8 chars of id>-YYYY-MM-DD.json`
pub fn single_session_export_filename(session_id: &str, now_ms: i64) -> String {
    let short_id: String = session_id.chars().take(8).collect();
    format!("session-{}-{}.json", short_id, format_date(now_ms))
}

/// Writes pretty JSON to `dir/filename`, creating `dir` if needed.
pub fn write_export<T: Serialize>(dir: &Path, filename: &str, data: &T) -> Result<PathBuf> {
    fs_err::create_dir_all(dir).map_err(|err| ClientError::io("create export directory", err))?;
    let path = dir.join(filename);
    let content = serde_json::to_string_pretty(data)
        .map_err(|err| ClientError::json(format!("encode {}", filename), err))?;
    fs_err::write(&path, content).map_err(|err| ClientError::io(format!("write {}", filename), err))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::FeedbackSession;
    use serde_json::json;

    fn entry(id: &str) -> SessionHistoryEntry {
        SessionHistoryEntry {
            session: FeedbackSession {
                session_id: id.to_string(),
                status: SessionStatus::Completed,
                created_at: 1_000.0,
                completed_at: Some(1_090.0),
                duration: Some(90.0),
                project_directory: Some("/work/app".to_string()),
                summary: Some("Refactored parser".to_string()),
            },
            saved_at: 1_090_500,
        }
    }

    #[test]
    fn history_export_shape() {
        let export = HistoryExport::new(&[entry("a"), entry("b")], 0);
        let value = serde_json::to_value(&export).expect("serialize");

        assert_eq!(value["exportedAt"], json!("1970-01-01T00:00:00+00:00"));
        assert_eq!(value["totalSessions"], json!(2));
        assert_eq!(value["sessions"][0]["ai_summary"], json!("Refactored parser"));
        assert_eq!(value["sessions"][1]["session_id"], json!("b"));
    }

    #[test]
    fn exports_read_back() {
        let export = SingleSessionExport::new(&entry("abcdef123456"), 86_400_000);
        let text = serde_json::to_string(&export).expect("serialize");
        let parsed: SingleSessionExport = serde_json::from_str(&text).expect("parse");
        assert_eq!(parsed, export);
    }

    #[test]
    fn filenames_use_date_and_short_id() {
        assert_eq!(history_export_filename(0), "session-history-1970-01-01.json");
        assert_eq!(
            single_session_export_filename("abcdef123456", 0),
            "session-abcdef12-1970-01-01.json"
        );
        assert_eq!(
            single_session_export_filename("abc", 0),
            "session-abc-1970-01-01.json"
        );
    }

    #[test]
    fn write_export_creates_directory() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let dir = temp_dir.path().join("exports");
        let export = HistoryExport::new(&[entry("a")], 0);

        let path = write_export(&dir, &history_export_filename(0), &export).expect("write");
        let content = fs_err::read_to_string(&path).expect("read");
        let parsed: HistoryExport = serde_json::from_str(&content).expect("parse");
        assert_eq!(parsed.total_sessions, 1);
    }
}
