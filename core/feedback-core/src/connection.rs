//! Reconnecting socket connection with its own heartbeat.
//!
//! `ConnectionManager` owns a [`Transport`] and reacts to the events the host
//! feeds back through [`handle_event`](ConnectionManager::handle_event). It
//! never blocks and never sleeps: the heartbeat and the reconnect delay are
//! owned timers fired from [`on_tick`](ConnectionManager::on_tick).
//!
//! ```text
//! Idle → Connecting → Open → Closed | Errored → Connecting (retry)
//!                                  ↘ Closed (terminal: 1000, 4004, close())
//! ```

use feedback_protocol::{
    classify_close, parse_server_frame, ClientMessage, CloseDisposition, Inbound, ServerMessage,
    CLOSE_NORMAL,
};

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::timer::{earliest, IntervalTimer, OneShotTimer};

/// A bidirectional text channel. Implementations deliver their events back to
/// the owner asynchronously as [`TransportEvent`]s.
///
/// An `Error` on an open connection is treated as a loss on its own; a
/// `Closed` that follows it is optional.
pub trait Transport: Send {
    /// Starts opening a connection. `Ok` means the attempt is underway, not
    /// that it succeeded.
    fn open(&mut self, url: &str) -> Result<()>;
    fn send(&mut self, text: &str) -> Result<()>;
    fn close(&mut self, code: u16, reason: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed { code: u16, reason: String },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed { code: u16, reason: String },
    Errored,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed { .. } => "closed",
            ConnectionState::Errored => "errored",
        }
    }
}

/// Typed events produced for the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Message(ServerMessage),
    Closed {
        code: u16,
        reason: String,
        disposition: CloseDisposition,
        will_retry: bool,
    },
    /// The attempt cap was reached; no further reconnects.
    GaveUp { attempts: u32 },
    Errored(String),
}

pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    url: String,
    config: ConnectionConfig,
    state: ConnectionState,
    reconnect_attempts: u32,
    heartbeat: IntervalTimer,
    reconnect: OneShotTimer,
    intentional_close: bool,
    tab_id: Option<String>,
}

impl ConnectionManager {
    pub fn new(transport: Box<dyn Transport>, url: impl Into<String>, config: &ConnectionConfig) -> Self {
        Self {
            transport,
            url: url.into(),
            config: config.clone(),
            state: ConnectionState::Idle,
            reconnect_attempts: 0,
            heartbeat: IntervalTimer::new(config.heartbeat_ms),
            reconnect: OneShotTimer::new(),
            intentional_close: false,
            tab_id: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn is_reconnect_scheduled(&self) -> bool {
        self.reconnect.is_armed()
    }

    /// Tab id carried in transport heartbeats.
    pub fn set_tab_id(&mut self, tab_id: impl Into<String>) {
        self.tab_id = Some(tab_id.into());
    }

    pub fn next_deadline(&self) -> Option<i64> {
        earliest([self.heartbeat.next_deadline(), self.reconnect.next_deadline()])
    }

    /// Starts a connection attempt unless one is already open or underway.
    pub fn connect(&mut self, now: i64) -> Vec<ConnectionEvent> {
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            return Vec::new();
        }

        self.intentional_close = false;
        self.reconnect.cancel();
        self.state = ConnectionState::Connecting;
        tracing::info!(url = %self.url, attempt = self.reconnect_attempts, "Connecting");

        match self.transport.open(&self.url) {
            Ok(()) => Vec::new(),
            Err(err) => self.open_failed(err.to_string(), now),
        }
    }

    /// Applies one transport event and returns what the controller should see.
    pub fn handle_event(&mut self, event: TransportEvent, now: i64) -> Vec<ConnectionEvent> {
        match event {
            TransportEvent::Opened => self.on_opened(now),
            TransportEvent::Message(text) => self.on_frame(&text).into_iter().collect(),
            TransportEvent::Closed { code, reason } => self.on_closed(code, reason, now),
            TransportEvent::Error(details) => self.on_error(details, now),
        }
    }

    /// Fires the transport heartbeat and the reconnect timer when due.
    pub fn on_tick(&mut self, now: i64) -> Vec<ConnectionEvent> {
        if self.heartbeat.poll(now) && self.is_open() {
            let heartbeat = ClientMessage::Heartbeat {
                tab_id: self.tab_id.clone().unwrap_or_default(),
                timestamp: now,
            };
            if self.send(&heartbeat) {
                tracing::debug!("Transport heartbeat sent");
            }
        }

        if self.reconnect.poll(now) && !self.intentional_close {
            self.reconnect_attempts += 1;
            tracing::info!(attempt = self.reconnect_attempts, "Reconnecting");
            return self.connect(now);
        }

        Vec::new()
    }

    /// Transmits only while open. Failures are logged and reported as false.
    pub fn send(&mut self, message: &ClientMessage) -> bool {
        if !self.is_open() {
            tracing::warn!(kind = message.kind(), state = self.state.label(), "Send while not connected");
            return false;
        }

        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(kind = message.kind(), error = %err, "Failed to encode message");
                return false;
            }
        };

        match self.transport.send(&text) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(kind = message.kind(), error = %err, "Failed to send message");
                false
            }
        }
    }

    /// Intentional shutdown. Idempotent.
    pub fn close(&mut self) {
        self.heartbeat.cancel();
        self.reconnect.cancel();
        if self.intentional_close {
            return;
        }
        self.intentional_close = true;

        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Errored
        ) {
            self.transport.close(CLOSE_NORMAL, "client closing");
        }
        self.state = ConnectionState::Closed {
            code: CLOSE_NORMAL,
            reason: "client closing".to_string(),
        };
        tracing::info!("Connection closed by client");
    }

    fn on_opened(&mut self, now: i64) -> Vec<ConnectionEvent> {
        if self.intentional_close {
            // Raced with close(): finish the shutdown instead of reviving.
            self.transport.close(CLOSE_NORMAL, "client closing");
            return Vec::new();
        }

        self.state = ConnectionState::Open;
        self.reconnect_attempts = 0;
        self.reconnect.cancel();
        self.heartbeat.start(now);
        tracing::info!(url = %self.url, "Connection open");

        self.send(&ClientMessage::GetStatus);
        vec![ConnectionEvent::Opened]
    }

    fn on_frame(&mut self, text: &str) -> Option<ConnectionEvent> {
        match parse_server_frame(text) {
            Ok(Inbound::Message(ServerMessage::HeartbeatResponse)) => {
                tracing::debug!("Heartbeat acknowledged");
                Some(ConnectionEvent::Message(ServerMessage::HeartbeatResponse))
            }
            Ok(Inbound::Message(message)) => {
                tracing::debug!(kind = message.kind(), "Frame received");
                Some(ConnectionEvent::Message(message))
            }
            Ok(Inbound::Unknown { kind }) => {
                tracing::warn!(kind = %kind, "Dropping frame of unknown type");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "Dropping malformed frame");
                None
            }
        }
    }

    fn on_closed(&mut self, code: u16, reason: String, now: i64) -> Vec<ConnectionEvent> {
        if self.state == ConnectionState::Idle {
            return Vec::new();
        }
        self.heartbeat.cancel();

        let disposition = classify_close(code);
        if self.intentional_close {
            self.state = ConnectionState::Closed { code, reason };
            return Vec::new();
        }

        // The error that preceded this close already armed the retry.
        if self.state == ConnectionState::Errored
            && disposition == CloseDisposition::Retry
            && self.reconnect.is_armed()
        {
            tracing::debug!(code, "Close after transport error, retry already scheduled");
            self.state = ConnectionState::Closed { code, reason };
            return Vec::new();
        }

        self.state = ConnectionState::Closed {
            code,
            reason: reason.clone(),
        };

        let mut events = Vec::new();
        let will_retry = match disposition {
            CloseDisposition::Retry => match self.schedule_reconnect(now) {
                Some(gave_up) => {
                    events.push(gave_up);
                    false
                }
                None => true,
            },
            CloseDisposition::Normal | CloseDisposition::NoActiveSession => {
                self.reconnect.cancel();
                false
            }
        };
        tracing::info!(code, reason = %reason, will_retry, "Connection closed");

        events.insert(
            0,
            ConnectionEvent::Closed {
                code,
                reason,
                disposition,
                will_retry,
            },
        );
        events
    }

    fn on_error(&mut self, details: String, now: i64) -> Vec<ConnectionEvent> {
        if self.intentional_close {
            return Vec::new();
        }
        match self.state {
            // No close event follows a failed open.
            ConnectionState::Connecting => self.open_failed(details, now),
            ConnectionState::Open => {
                tracing::warn!(error = %details, "Transport error on open connection");
                self.heartbeat.cancel();
                self.state = ConnectionState::Errored;
                let mut events = vec![ConnectionEvent::Errored(details)];
                events.extend(self.schedule_reconnect(now));
                events
            }
            _ => {
                tracing::debug!(error = %details, "Transport error while not connected");
                Vec::new()
            }
        }
    }

    fn open_failed(&mut self, details: String, now: i64) -> Vec<ConnectionEvent> {
        tracing::warn!(url = %self.url, error = %details, "Connection attempt failed");
        self.state = ConnectionState::Errored;
        let mut events = vec![ConnectionEvent::Errored(details)];
        events.extend(self.schedule_reconnect(now));
        events
    }

    /// Arms the one-shot reconnect, or returns `GaveUp` when the cap is hit.
    fn schedule_reconnect(&mut self, now: i64) -> Option<ConnectionEvent> {
        if let Some(max) = self.config.max_reconnect_attempts {
            if self.reconnect_attempts >= max {
                tracing::warn!(attempts = self.reconnect_attempts, "Giving up on reconnecting");
                return Some(ConnectionEvent::GaveUp {
                    attempts: self.reconnect_attempts,
                });
            }
        }
        if self.reconnect.arm(now, self.config.reconnect_delay_ms) {
            tracing::debug!(delay_ms = self.config.reconnect_delay_ms, "Reconnect scheduled");
        }
        None
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}
