//! feedback-client: terminal client for interactive feedback sessions.
//!
//! Connects to a running feedback server, shows the AI work summary and sends
//! the user's feedback back. Several clients on one machine coordinate through
//! the shared store under `~/.mcp-feedback/kv`.
//!
//! ## Subcommands
//!
//! - `run`: Interactive session (default)
//! - `tabs`: List live client instances
//! - `history`: Show the local session history
//! - `export`: Write the history, or one session, as JSON

mod http_api;
mod logging;
mod run;
mod view;
mod ws_transport;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use feedback_core::session::{
    history_export_filename, single_session_export_filename, write_export,
};
use feedback_core::{
    AppContext, ClientConfig, ClientError, Clock, FileStore, KeyValueStore, Result,
    SessionDataManager, StorageConfig, SystemClock, TabCoordinator,
};

use crate::http_api::HttpApi;

#[derive(Parser)]
#[command(name = "feedback-client")]
#[command(about = "Interactive feedback session client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the server and collect feedback interactively
    Run {
        /// Server origin, e.g. http://127.0.0.1:8765 (overrides client.toml)
        #[arg(long)]
        server: Option<String>,
    },

    /// List client instances currently registered in the shared store
    Tabs,

    /// Show recent sessions kept in local history
    History {
        /// Print the export document instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Export session history to a JSON file
    Export {
        /// Export only this session id
        #[arg(long)]
        session: Option<String>,

        /// Output directory (defaults to ~/.mcp-feedback/exports)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let storage = StorageConfig::default();
    let _logging_guard = logging::init(&storage.logs_dir());

    let command = cli.command.unwrap_or(Commands::Run { server: None });
    if let Err(e) = dispatch(command, &storage) {
        tracing::error!(error = %e, "feedback-client failed");
        eprintln!("feedback-client: {}", e);
        std::process::exit(1);
    }
}

fn dispatch(command: Commands, storage: &StorageConfig) -> Result<()> {
    storage
        .ensure_dirs()
        .map_err(|err| ClientError::io("create storage directories", err))?;
    let mut config = ClientConfig::load(&storage.config_file())?;
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(storage.kv_dir()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match command {
        Commands::Run { server } => {
            if let Some(server) = server {
                config.server_url = server;
            }
            let api = Arc::new(HttpApi::new(config.http_base()?)?);
            tracing::info!(server = %config.server_url, "Starting interactive session");
            run::run(AppContext {
                config,
                store,
                api,
                clock,
            })
        }
        Commands::Tabs => {
            let api = Arc::new(HttpApi::new(config.http_base()?)?);
            let tabs = TabCoordinator::new(store, api, config.server_url.clone(), &config.tabs);
            let rows = tab_rows(&tabs, clock.now_ms());
            if rows.is_empty() {
                println!("No active clients.");
            }
            for row in rows {
                println!("{}", row);
            }
            Ok(())
        }
        Commands::History { json } => {
            let now = clock.now_ms();
            let sessions = SessionDataManager::new(store, config.history.retention_hours, now);
            if json {
                let export = sessions.export_session_history(now);
                let text = serde_json::to_string_pretty(&export)
                    .map_err(|err| ClientError::json("encode history", err))?;
                println!("{}", text);
            } else if sessions.history().is_empty() {
                println!("No sessions in history.");
            } else {
                let stats = sessions.stats();
                println!(
                    "{} sessions today, {} kept, average {}",
                    stats.today_count,
                    stats.total_sessions,
                    view::format_duration(stats.average_duration as f64)
                );
                for entry in sessions.history() {
                    println!("{}", view::format_history_row(entry));
                }
            }
            Ok(())
        }
        Commands::Export { session, out } => {
            let now = clock.now_ms();
            let sessions = SessionDataManager::new(store, config.history.retention_hours, now);
            let dir = out.unwrap_or_else(|| storage.exports_dir());
            let path = match session {
                Some(id) => {
                    let export = sessions
                        .export_single_session(&id, now)
                        .ok_or_else(|| ClientError::SessionNotFound(id.clone()))?;
                    write_export(&dir, &single_session_export_filename(&id, now), &export)?
                }
                None => {
                    let export = sessions.export_session_history(now);
                    write_export(&dir, &history_export_filename(now), &export)?
                }
            };
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// One line per live tab, after the coordinator's expiry sweep.
fn tab_rows(tabs: &TabCoordinator, now: i64) -> Vec<String> {
    tabs.list_active_tabs(now)
        .iter()
        .map(|record| {
            format!(
                "{}  last seen {}s ago  {}",
                record.tab_id,
                (now - record.timestamp).max(0) / 1000,
                record.url
            )
        })
        .collect()
}
