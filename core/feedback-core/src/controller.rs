//! Application controller: wires the tab coordinator, connection, lifecycle
//! and session manager together and talks to the UI through [`FeedbackView`].
//!
//! The host drives it from one thread:
//!
//! ```rust,ignore
//! let mut app = FeedbackApp::new(ctx, transport, view)?;
//! app.start();
//! loop {
//!     // wait for a transport event or until app.next_deadline()
//!     app.handle_transport_event(event);
//!     app.tick();
//! }
//! app.shutdown();
//! ```
//!
//! Server REST calls made after startup run on detached threads; their results
//! are picked up on the next `tick()`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use feedback_protocol::{ClientMessage, CloseDisposition, ServerMessage};

use crate::api::{CurrentSessionInfo, ServerApi};
use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState, Transport, TransportEvent};
use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::lifecycle::{FeedbackPayload, FeedbackStateMachine, SubmitRejection};
use crate::session::{SessionDataManager, SessionUpdate};
use crate::settings::Settings;
use crate::status::SessionStatus;
use crate::tabs::TabCoordinator;
use crate::time::Clock;
use crate::timer::earliest;
use crate::view::{FeedbackView, MessageLevel};

/// How often the host should tick while a background refresh is outstanding.
const REFRESH_POLL_MS: i64 = 100;

/// Process-wide collaborators, built once and handed to every component.
#[derive(Clone)]
pub struct AppContext {
    pub config: ClientConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub api: Arc<dyn ServerApi>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    /// Stashed until the transport opens.
    Queued,
    Rejected(SubmitRejection),
    SendFailed,
}

pub struct FeedbackApp {
    ctx: AppContext,
    tabs: TabCoordinator,
    connection: ConnectionManager,
    lifecycle: FeedbackStateMachine,
    sessions: SessionDataManager,
    settings: Settings,
    view: Box<dyn FeedbackView>,
    shown_connection: ConnectionState,
    active_tabs: Arc<AtomicUsize>,
    refresh_tx: Sender<Result<CurrentSessionInfo>>,
    refresh_rx: Receiver<Result<CurrentSessionInfo>>,
    refreshes_in_flight: usize,
    started: bool,
    shut_down: bool,
}

impl FeedbackApp {
    pub fn new(
        ctx: AppContext,
        transport: Box<dyn Transport>,
        view: Box<dyn FeedbackView>,
    ) -> Result<Self> {
        let ws_url = ctx.config.websocket_url()?;
        let now = ctx.clock.now_ms();

        let mut tabs = TabCoordinator::new(
            Arc::clone(&ctx.store),
            Arc::clone(&ctx.api),
            ctx.config.server_url.clone(),
            &ctx.config.tabs,
        );
        let active_tabs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&active_tabs);
        tabs.set_change_listener(move |records| {
            counter.store(records.len(), Ordering::SeqCst);
        });

        let connection = ConnectionManager::new(transport, ws_url, &ctx.config.connection);
        let sessions = SessionDataManager::new(
            Arc::clone(&ctx.store),
            ctx.config.history.retention_hours,
            now,
        );
        let settings = Settings {
            session_history_retention_hours: ctx.config.history.retention_hours,
            ..Settings::default()
        };
        let (refresh_tx, refresh_rx) = mpsc::channel();

        Ok(Self {
            ctx,
            tabs,
            connection,
            lifecycle: FeedbackStateMachine::new(),
            sessions,
            settings,
            view,
            shown_connection: ConnectionState::Idle,
            active_tabs,
            refresh_tx,
            refresh_rx,
            refreshes_in_flight: 0,
            started: false,
            shut_down: false,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn lifecycle(&self) -> &FeedbackStateMachine {
        &self.lifecycle
    }

    pub fn sessions(&self) -> &SessionDataManager {
        &self.sessions
    }

    pub fn tabs(&self) -> &TabCoordinator {
        &self.tabs
    }

    /// Active tab count as of the last change seen from another tab.
    pub fn active_tab_count(&self) -> usize {
        self.active_tabs.load(Ordering::SeqCst)
    }

    pub fn connection_state(&self) -> &ConnectionState {
        self.connection.state()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.connection.reconnect_attempts()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn can_submit(&self) -> bool {
        self.lifecycle.can_submit(self.connection.is_open())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle of the app itself
    // ─────────────────────────────────────────────────────────────────────────────

    /// Loads settings, registers the tab and opens the transport.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let now = self.ctx.clock.now_ms();

        match self.ctx.api.load_settings() {
            Ok(settings) => {
                self.sessions.set_retention_hours(settings.retention_hours(), now);
                self.settings = settings;
            }
            Err(err) => tracing::warn!(error = %err, "Settings unavailable, using local defaults"),
        }

        let tab_id = self.tabs.start(now);
        self.active_tabs
            .store(self.tabs.list_active_tabs(now).len(), Ordering::SeqCst);
        self.connection.set_tab_id(tab_id);

        let events = self.connection.connect(now);
        self.dispatch(events, now);
        self.sync_connection_view();
    }

    /// Stops the tab heartbeat and closes the transport. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.tabs.stop();
        self.connection.close();
        self.sync_connection_view();
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        let now = self.ctx.clock.now_ms();
        let events = self.connection.handle_event(event, now);
        self.dispatch(events, now);
        self.sync_connection_view();
    }

    /// Polls storage, fires due timers and collects background results.
    pub fn tick(&mut self) {
        let now = self.ctx.clock.now_ms();

        self.ctx.store.poll();
        self.tabs.poll_changes(now);
        self.tabs.on_tick(now);

        let events = self.connection.on_tick(now);
        self.dispatch(events, now);
        self.drain_refreshes();
        self.sync_connection_view();
    }

    /// Earliest moment `tick()` has work to do.
    pub fn next_deadline(&self) -> Option<i64> {
        let refresh = (self.refreshes_in_flight > 0)
            .then(|| self.ctx.clock.now_ms() + REFRESH_POLL_MS);
        earliest([
            self.tabs.next_deadline(),
            self.connection.next_deadline(),
            refresh,
        ])
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // User actions
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn submit_feedback(&mut self, payload: FeedbackPayload) -> SubmitOutcome {
        if payload.is_empty() {
            self.view
                .show_message(MessageLevel::Warning, SubmitRejection::Empty.message());
            return SubmitOutcome::Rejected(SubmitRejection::Empty);
        }

        match self.lifecycle.check_submit(self.connection.is_open()) {
            Ok(()) => self.submit_internal(payload),
            Err(SubmitRejection::NotConnected) => {
                if self.lifecycle.stash_pending(payload) {
                    tracing::debug!("Pending submission replaced by a newer one");
                }
                self.view.show_message(
                    MessageLevel::Info,
                    SubmitRejection::NotConnected.message(),
                );
                SubmitOutcome::Queued
            }
            Err(rejection) => {
                self.view.show_message(MessageLevel::Warning, rejection.message());
                SubmitOutcome::Rejected(rejection)
            }
        }
    }

    /// Sends a shell command to the server. Output arrives as messages.
    pub fn run_command(&mut self, command: &str) -> bool {
        let command = command.trim();
        if command.is_empty() {
            self.view.append_command_output("Please enter a command\n");
            return false;
        }
        if !self.connection.is_open() {
            self.view
                .append_command_output("Not connected, cannot run command\n");
            return false;
        }

        self.view.append_command_output(&format!("$ {}\n", command));
        let message = ClientMessage::RunCommand {
            command: command.to_string(),
        };
        if self.connection.send(&message) {
            self.view.append_command_output("[running...]\n");
            true
        } else {
            self.view.append_command_output("Failed to send command\n");
            false
        }
    }

    /// Applies new settings locally and saves them in the background.
    pub fn apply_settings(&mut self, settings: Settings) {
        let now = self.ctx.clock.now_ms();
        let removed = self
            .sessions
            .set_retention_hours(settings.retention_hours(), now);
        if removed > 0 {
            tracing::info!(removed, "Retention change pruned history");
        }
        self.settings = settings.clone();

        let api = Arc::clone(&self.ctx.api);
        thread::spawn(move || {
            if let Err(err) = api.save_settings(&settings) {
                tracing::warn!(error = %err, "Failed to save settings");
            }
        });
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Routing
    // ─────────────────────────────────────────────────────────────────────────────

    fn submit_internal(&mut self, payload: FeedbackPayload) -> SubmitOutcome {
        let open = self.connection.is_open();
        if !self.lifecycle.begin_submit(open) {
            let rejection = self
                .lifecycle
                .check_submit(open)
                .err()
                .unwrap_or(SubmitRejection::Processing);
            return SubmitOutcome::Rejected(rejection);
        }
        self.notify_lifecycle();

        if self.connection.send(&payload.to_message()) {
            self.lifecycle.on_sent(self.ctx.clock.now_ms());
            tracing::info!(
                images = payload.images.len(),
                session_id = self.lifecycle.session_id().unwrap_or("none"),
                "Feedback sent"
            );
            SubmitOutcome::Sent
        } else {
            self.lifecycle.on_send_failed();
            self.notify_lifecycle();
            self.view
                .show_message(MessageLevel::Error, "Sending feedback failed, please retry");
            SubmitOutcome::SendFailed
        }
    }

    fn dispatch(&mut self, events: Vec<ConnectionEvent>, now: i64) {
        for event in events {
            match event {
                ConnectionEvent::Opened => {
                    self.view.show_message(MessageLevel::Info, "Connected");
                    if let Some(pending) = self.lifecycle.take_pending() {
                        tracing::info!("Replaying pending submission");
                        self.submit_internal(pending);
                    }
                }
                ConnectionEvent::Message(message) => self.route_message(message, now),
                ConnectionEvent::Closed {
                    code,
                    disposition,
                    will_retry,
                    ..
                } => {
                    if self.lifecycle.on_transport_closed() {
                        self.notify_lifecycle();
                    }
                    match disposition {
                        CloseDisposition::NoActiveSession => self.view.show_message(
                            MessageLevel::Warning,
                            "No active feedback session on the server",
                        ),
                        CloseDisposition::Retry if will_retry => self.view.show_message(
                            MessageLevel::Warning,
                            &format!("Connection lost (code {}), reconnecting", code),
                        ),
                        CloseDisposition::Retry => {}
                        CloseDisposition::Normal => {
                            self.view.show_message(MessageLevel::Info, "Connection closed")
                        }
                    }
                }
                ConnectionEvent::GaveUp { attempts } => self.view.show_message(
                    MessageLevel::Error,
                    &format!("Could not reconnect after {} attempts", attempts),
                ),
                ConnectionEvent::Errored(details) => {
                    if self.lifecycle.on_transport_closed() {
                        self.notify_lifecycle();
                    }
                    self.view.show_message(
                        MessageLevel::Warning,
                        &format!("Connection error: {}", details),
                    );
                }
            }
        }
    }

    fn route_message(&mut self, message: ServerMessage, now: i64) {
        match message {
            ServerMessage::ConnectionEstablished => {
                tracing::debug!("Server confirmed connection");
            }
            ServerMessage::HeartbeatResponse => {}
            ServerMessage::CommandOutput { output } => self.view.append_command_output(&output),
            ServerMessage::CommandComplete { exit_code } => self.view.append_command_output(
                &format!("\n[command finished, exit code: {}]\n", exit_code),
            ),
            ServerMessage::CommandError { error } => self
                .view
                .append_command_output(&format!("\n[error: {}]\n", error)),
            ServerMessage::FeedbackReceived { message } => {
                if self.lifecycle.on_feedback_received(now) {
                    self.notify_lifecycle();
                }
                let text = message.unwrap_or_else(|| "Feedback submitted".to_string());
                self.view.show_message(MessageLevel::Success, &text);
            }
            ServerMessage::StatusUpdate { status_info } => {
                self.sessions.update_status_info(&status_info, now);
                let status = status_info.status.as_deref().and_then(SessionStatus::parse);
                if self
                    .lifecycle
                    .apply_status(status, status_info.session_id.as_deref(), now)
                {
                    self.notify_lifecycle();
                }
            }
            ServerMessage::SessionUpdated {
                message,
                session_info,
            } => {
                let text = message.unwrap_or_else(|| "Session updated".to_string());
                self.view.show_message(MessageLevel::Success, &text);

                let session_id = match &session_info {
                    Some(info) => {
                        self.sessions
                            .update_current_session(SessionUpdate::from(info), now);
                        Some(info.session_id.clone())
                    }
                    None => self.lifecycle.session_id().map(str::to_string),
                };
                if let Some(id) = session_id {
                    self.lifecycle.on_session_replaced(&id);
                    self.notify_lifecycle();
                }
                self.request_refresh();
            }
        }
    }

    fn request_refresh(&mut self) {
        let api = Arc::clone(&self.ctx.api);
        let tx = self.refresh_tx.clone();
        self.refreshes_in_flight += 1;
        thread::spawn(move || {
            // A closed receiver means the app already shut down.
            let _ = tx.send(api.current_session());
        });
    }

    fn drain_refreshes(&mut self) {
        while let Ok(result) = self.refresh_rx.try_recv() {
            self.refreshes_in_flight = self.refreshes_in_flight.saturating_sub(1);
            match result {
                Ok(info) => {
                    if let Some(id) = info.session_id.as_deref() {
                        if self.lifecycle.session_id() != Some(id) {
                            self.lifecycle.on_session_replaced(id);
                            self.notify_lifecycle();
                        }
                    }
                    self.view.session_refreshed(&info);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Session refresh failed");
                    self.view.show_message(
                        MessageLevel::Warning,
                        "Could not refresh session content",
                    );
                }
            }
        }
    }

    fn notify_lifecycle(&mut self) {
        self.view
            .lifecycle_changed(self.lifecycle.state(), self.lifecycle.session_id());
    }

    fn sync_connection_view(&mut self) {
        let state = self.connection.state();
        if *state != self.shown_connection {
            self.shown_connection = state.clone();
            self.view.connection_changed(state);
        }
    }
}

impl Drop for FeedbackApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}
