//! WebSocket transport on a dedicated I/O thread.
//!
//! Each `open` starts a thread that owns one socket. Outgoing frames reach it
//! through a channel; everything it observes is reported to the sink as a
//! [`TransportEvent`]. The read side polls with a short timeout so queued
//! writes are never stuck behind a blocking read.

use std::borrow::Cow;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use feedback_core::{ClientError, Result, Transport, TransportEvent};
use feedback_protocol::{CLOSE_ABNORMAL, MAX_FRAME_BYTES};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

const READ_POLL_MS: u64 = 50;
const MAX_REDIRECTS: u8 = 3;
/// Reported when the peer closes without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

pub type EventSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

pub struct WsTransport {
    sink: EventSink,
    outgoing: Option<Sender<Outgoing>>,
}

impl WsTransport {
    pub fn new(sink: EventSink) -> Self {
        Self {
            sink,
            outgoing: None,
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &str) -> Result<()> {
        // Dropping the old sender ends any previous I/O thread.
        let (tx, rx) = mpsc::channel();
        self.outgoing = Some(tx);

        let sink = Arc::clone(&self.sink);
        let target = url.to_string();
        thread::Builder::new()
            .name("feedback-ws".to_string())
            .spawn(move || run_socket(&target, rx, sink))
            .map_err(|err| ClientError::TransportConnect {
                url: url.to_string(),
                details: err.to_string(),
            })?;
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<()> {
        let tx = self.outgoing.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(Outgoing::Text(text.to_string()))
            .map_err(|_| ClientError::TransportSend("socket thread has exited".to_string()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        if let Some(tx) = self.outgoing.take() {
            let _ = tx.send(Outgoing::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }
}

fn run_socket(url: &str, rx: Receiver<Outgoing>, sink: EventSink) {
    let config = WebSocketConfig {
        max_message_size: Some(MAX_FRAME_BYTES),
        max_frame_size: Some(MAX_FRAME_BYTES),
        ..WebSocketConfig::default()
    };
    let mut socket = match tungstenite::client::connect_with_config(url, Some(config), MAX_REDIRECTS) {
        Ok((socket, _response)) => socket,
        Err(err) => {
            sink(TransportEvent::Error(err.to_string()));
            return;
        }
    };
    if let Err(err) = set_read_timeout(&socket, Duration::from_millis(READ_POLL_MS)) {
        tracing::warn!(error = %err, "Failed to set socket read timeout");
    }
    tracing::debug!(url = %url, "WebSocket handshake complete");
    sink(TransportEvent::Opened);

    loop {
        if !flush_outgoing(&mut socket, &rx, &sink) {
            return;
        }

        match socket.read() {
            Ok(Message::Text(text)) => sink(TransportEvent::Message(text)),
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|frame| (u16::from(frame.code), frame.reason.into_owned()))
                    .unwrap_or((CLOSE_NO_STATUS, String::new()));
                let _ = socket.flush();
                sink(TransportEvent::Closed { code, reason });
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                sink(TransportEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: String::new(),
                });
                return;
            }
            Err(err) => {
                report_lost(&sink, err.to_string());
                return;
            }
        }
    }
}

/// Writes queued frames. Returns false once the socket should stop.
fn flush_outgoing(socket: &mut Socket, rx: &Receiver<Outgoing>, sink: &EventSink) -> bool {
    loop {
        match rx.try_recv() {
            Ok(Outgoing::Text(text)) => {
                if let Err(err) = socket.send(Message::Text(text)) {
                    report_lost(sink, err.to_string());
                    return false;
                }
            }
            Ok(Outgoing::Close { code, reason }) => {
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: Cow::Owned(reason),
                };
                let _ = socket.close(Some(frame));
                let _ = socket.flush();
                return false;
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => {
                let _ = socket.close(None);
                let _ = socket.flush();
                return false;
            }
        }
    }
}

/// An error on an open socket ends it; the trailing abnormal close records the
/// code for the connection state.
fn report_lost(sink: &EventSink, details: String) {
    sink(TransportEvent::Error(details.clone()));
    sink(TransportEvent::Closed {
        code: CLOSE_ABNORMAL,
        reason: details,
    });
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}
