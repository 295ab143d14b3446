//! Logging setup: a daily rolling file under `<root>/logs` plus stderr for
//! warnings.
//!
//! `FEEDBACK_DEBUG_LOG=1` forces debug level; otherwise `RUST_LOG` applies,
//! defaulting to info.

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "FEEDBACK_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "feedback-client.log";

/// Installs the global subscriber. Keep the guard alive until exit so buffered
/// lines reach the file. Returns `None` when a subscriber was already set.
pub fn init(logs_dir: &Path) -> Option<WorkerGuard> {
    let filter = if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let stderr = std::io::stderr.with_max_level(tracing::Level::WARN);

    if let Err(err) = fs_err::create_dir_all(logs_dir) {
        eprintln!("feedback-client: log directory unavailable ({err}); logging to stderr only");
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(stderr)
            .try_init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(file_writer.and(stderr))
        .try_init()
        .ok()
        .map(|_| guard)
}

fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}
