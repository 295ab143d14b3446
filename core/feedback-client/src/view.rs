//! Line-oriented terminal rendering.

use std::io::{self, Write};

use feedback_core::{
    ConnectionState, CurrentSessionInfo, FeedbackView, LifecycleState, MessageLevel,
    SessionHistoryEntry,
};

#[derive(Debug, Default)]
pub struct TerminalView;

impl FeedbackView for TerminalView {
    fn show_message(&mut self, level: MessageLevel, text: &str) {
        println!("{} {}", level_tag(level), text);
    }

    fn append_command_output(&mut self, text: &str) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn connection_changed(&mut self, state: &ConnectionState) {
        match state {
            ConnectionState::Closed { code, reason } if !reason.is_empty() => {
                println!("[connection] closed ({}: {})", code, reason)
            }
            ConnectionState::Closed { code, .. } => println!("[connection] closed ({})", code),
            other => println!("[connection] {}", other.label()),
        }
    }

    fn lifecycle_changed(&mut self, state: LifecycleState, session_id: Option<&str>) {
        println!("[feedback] {} (session {})", state, session_id.unwrap_or("-"));
    }

    fn session_refreshed(&mut self, info: &CurrentSessionInfo) {
        if let Some(project) = info.project_name() {
            println!("== MCP Feedback - {} ==", project);
        }
        match info.summary.as_deref() {
            Some(summary) if !summary.trim().is_empty() => println!("{}", summary.trim_end()),
            _ => println!("(no summary)"),
        }
    }
}

fn level_tag(level: MessageLevel) -> &'static str {
    match level {
        MessageLevel::Info => "[info]",
        MessageLevel::Success => "[ok]",
        MessageLevel::Warning => "[warn]",
        MessageLevel::Error => "[error]",
    }
}

/// One row of the history table.
pub fn format_history_row(entry: &SessionHistoryEntry) -> String {
    let session = &entry.session;
    let short_id: String = session.session_id.chars().take(8).collect();
    let created = chrono::DateTime::from_timestamp(session.created_at as i64, 0)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let duration = session
        .duration
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());
    let project = session
        .project_directory
        .as_deref()
        .and_then(|dir| dir.rsplit(|c: char| c == '/' || c == '\\').find(|p| !p.is_empty()))
        .unwrap_or("-");

    format!(
        "{:<8}  {:<16}  {:>8}  {:<10}  {}",
        short_id, created, duration, session.status.as_str(), project
    )
}

pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h{:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedback_core::{FeedbackSession, SessionStatus};

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(0.4), "0s");
        assert_eq!(format_duration(59.0), "59s");
        assert_eq!(format_duration(90.0), "1m30s");
        assert_eq!(format_duration(3_725.0), "1h02m");
        assert_eq!(format_duration(-5.0), "0s");
    }

    #[test]
    fn history_row_shows_short_id_and_project() {
        let entry = SessionHistoryEntry {
            session: FeedbackSession {
                session_id: "abcdef123456".to_string(),
                status: SessionStatus::Completed,
                created_at: 1_700_000_000.0,
                completed_at: Some(1_700_000_090.0),
                duration: Some(90.0),
                project_directory: Some("/work/my-app".to_string()),
                summary: None,
            },
            saved_at: 1_700_000_090_000,
        };
        let row = format_history_row(&entry);
        assert!(row.starts_with("abcdef12"));
        assert!(row.contains("1m30s"));
        assert!(row.contains("completed"));
        assert!(row.ends_with("my-app"));
    }
}
