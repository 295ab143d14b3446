//! Session records: the current session, the bounded history, and exports.

mod export;
mod manager;
mod types;

pub use export::{
    history_export_filename, single_session_export_filename, write_export, ExportedSession,
    HistoryExport, SingleSessionExport,
};
pub use manager::{SessionDataManager, FALLBACK_DURATION_SECS, MAX_HISTORY};
pub use types::{FeedbackSession, SessionHistoryEntry, SessionStats, SessionUpdate, StoredHistory};
