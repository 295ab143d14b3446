//! Session status values and the "is this session finished" predicate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-reported session status.
///
/// Unrecognized strings deserialize to [`SessionStatus::Unknown`] rather than
/// failing the whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Waiting,
    Active,
    FeedbackSubmitted,
    Completed,
    Timeout,
    Expired,
    Error,
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    /// Parses a wire value. Empty strings mean "absent".
    pub fn parse(value: &str) -> Option<SessionStatus> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        let status = match trimmed {
            "waiting" => SessionStatus::Waiting,
            "active" => SessionStatus::Active,
            "feedback_submitted" => SessionStatus::FeedbackSubmitted,
            "completed" => SessionStatus::Completed,
            "timeout" => SessionStatus::Timeout,
            "expired" => SessionStatus::Expired,
            "error" => SessionStatus::Error,
            _ => SessionStatus::Unknown,
        };
        Some(status)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::FeedbackSubmitted => "feedback_submitted",
            SessionStatus::Completed => "completed",
            SessionStatus::Timeout => "timeout",
            SessionStatus::Expired => "expired",
            SessionStatus::Error => "error",
            SessionStatus::Unknown => "unknown",
        }
    }

    /// True for statuses that end a session and qualify it for history.
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Timeout
                | SessionStatus::Expired
                | SessionStatus::Error
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate over raw wire values.
pub fn is_completed_status(value: Option<&str>) -> bool {
    value
        .and_then(SessionStatus::parse)
        .map(|status| status.is_completed())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_completed() {
        for raw in ["completed", "timeout", "expired", "error"] {
            assert!(is_completed_status(Some(raw)), "{} should be completed", raw);
        }
    }

    #[test]
    fn live_statuses_are_not_completed() {
        for raw in ["waiting", "active", "feedback_submitted", "mystery"] {
            assert!(!is_completed_status(Some(raw)), "{} should not be completed", raw);
        }
        assert!(!is_completed_status(None));
        assert!(!is_completed_status(Some("  ")));
    }

    #[test]
    fn unknown_values_deserialize() {
        let status: SessionStatus = serde_json::from_str("\"paused\"").expect("parse");
        assert_eq!(status, SessionStatus::Unknown);
    }

    #[test]
    fn round_trips_through_snake_case() {
        let raw = serde_json::to_string(&SessionStatus::FeedbackSubmitted).expect("encode");
        assert_eq!(raw, "\"feedback_submitted\"");
    }
}
