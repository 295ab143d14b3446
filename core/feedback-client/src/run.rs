//! Interactive session: one loop thread owns the [`FeedbackApp`]; the socket
//! and stdin threads feed it through a channel.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use feedback_core::{
    AppContext, FeedbackApp, FeedbackPayload, Result, SubmitOutcome, TransportEvent,
};
use feedback_protocol::SubmitSettings;

use crate::view::{format_duration, format_history_row, TerminalView};
use crate::ws_transport::{EventSink, WsTransport};

/// Upper bound on one wait so shared-store changes are polled regularly.
const MAX_WAIT_MS: i64 = 1_000;

enum LoopEvent {
    Transport(TransportEvent),
    Input(String),
    InputClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    Run(String),
    Status,
    History,
    Help,
    Quit,
    Unknown(String),
}

/// Plain text is feedback; slash-prefixed lines are commands.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Submit(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "submit" => Command::Submit(arg.to_string()),
        "run" => Command::Run(arg.to_string()),
        "status" => Command::Status,
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

pub fn run(ctx: AppContext) -> Result<()> {
    let (tx, rx) = mpsc::channel::<LoopEvent>();

    let transport_tx = tx.clone();
    let sink: EventSink = Arc::new(move |event: TransportEvent| {
        let _ = transport_tx.send(LoopEvent::Transport(event));
    });
    let clock = Arc::clone(&ctx.clock);
    let mut app = FeedbackApp::new(ctx, Box::new(WsTransport::new(sink)), Box::new(TerminalView))?;

    spawn_stdin_reader(tx);
    app.start();
    print_help();

    loop {
        let wait = wait_for(app.next_deadline(), clock.now_ms());
        match rx.recv_timeout(wait) {
            Ok(LoopEvent::Transport(event)) => app.handle_transport_event(event),
            Ok(LoopEvent::Input(line)) => {
                if !handle_line(&mut app, &line) {
                    break;
                }
            }
            Ok(LoopEvent::InputClosed) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        app.tick();
    }

    app.shutdown();
    tracing::info!("Interactive session ended");
    Ok(())
}

fn wait_for(deadline: Option<i64>, now: i64) -> Duration {
    let wait_ms = deadline
        .map(|deadline| (deadline - now).clamp(0, MAX_WAIT_MS))
        .unwrap_or(MAX_WAIT_MS);
    Duration::from_millis(wait_ms as u64)
}

fn spawn_stdin_reader(tx: Sender<LoopEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(LoopEvent::Input(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to read stdin");
                    break;
                }
            }
        }
        let _ = tx.send(LoopEvent::InputClosed);
    });
}

/// Returns false when the user asked to quit.
fn handle_line(app: &mut FeedbackApp, line: &str) -> bool {
    let Some(command) = parse_command(line) else {
        return true;
    };

    match command {
        Command::Submit(text) => {
            let settings = SubmitSettings {
                image_size_limit: app.settings().image_size_limit,
                enable_base64_detail: app.settings().enable_base64_detail,
            };
            let payload = FeedbackPayload {
                feedback: text,
                settings,
                ..FeedbackPayload::default()
            };
            if app.submit_feedback(payload) == SubmitOutcome::Sent {
                println!("[feedback] sent, waiting for the server to confirm");
            }
        }
        Command::Run(command) => {
            app.run_command(&command);
        }
        Command::Status => print_status(app),
        Command::History => print_history(app),
        Command::Help => print_help(),
        Command::Quit => return false,
        Command::Unknown(name) => println!("Unknown command /{}. Type /help.", name),
    }
    true
}

fn print_status(app: &FeedbackApp) {
    println!("connection : {}", app.connection_state().label());
    println!("feedback   : {}", app.lifecycle().state());
    println!("session    : {}", app.lifecycle().session_id().unwrap_or("-"));
    println!("tab        : {}", app.tabs().tab_id().unwrap_or("-"));
    println!("tabs open  : {}", app.active_tab_count().max(1));
    if let Some(current) = app.sessions().current() {
        println!("status     : {}", current.status);
        if let Some(summary) = current.summary.as_deref() {
            println!("summary    : {}", summary);
        }
    }
}

fn print_history(app: &FeedbackApp) {
    let stats = app.sessions().stats();
    println!(
        "{} sessions today, {} kept, average {}",
        stats.today_count,
        stats.total_sessions,
        format_duration(stats.average_duration as f64)
    );
    for entry in app.sessions().history() {
        println!("{}", format_history_row(entry));
    }
}

fn print_help() {
    println!("Type feedback and press Enter to submit it.");
    println!("  /run <command>   run a shell command on the server");
    println!("  /status          connection and session state");
    println!("  /history         recent sessions");
    println!("  /quit            exit");
}
