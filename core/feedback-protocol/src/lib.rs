//! WebSocket protocol types for the feedback client.
//!
//! Both directions are closed tagged enums keyed by the `type` field. Inbound
//! frames are parsed defensively: a discriminator this crate does not know is
//! reported as [`Inbound::Unknown`] so callers can log and drop it, while a
//! known discriminator with a broken payload is a [`ProtocolError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normal, intentional closure. Never retried.
pub const CLOSE_NORMAL: u16 = 1000;
/// Abnormal closure reported locally when the socket dies without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// The server has no active feedback session for this client. Never retried.
pub const CLOSE_NO_ACTIVE_SESSION: u16 = 4004;
pub const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024; // images travel inline as base64

const KNOWN_SERVER_TYPES: &[&str] = &[
    "connection_established",
    "heartbeat_response",
    "command_output",
    "command_complete",
    "command_error",
    "feedback_received",
    "status_update",
    "session_updated",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    MalformedFrame(String),

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("invalid `{kind}` payload: {details}")]
    InvalidPayload { kind: String, details: String },

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// How the client should react to a transport close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    Normal,
    NoActiveSession,
    Retry,
}

pub fn classify_close(code: u16) -> CloseDisposition {
    match code {
        CLOSE_NORMAL => CloseDisposition::Normal,
        CLOSE_NO_ACTIVE_SESSION => CloseDisposition::NoActiveSession,
        _ => CloseDisposition::Retry,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Client → Server
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubmitFeedback {
        feedback: String,
        #[serde(default)]
        images: Vec<ImageAttachment>,
        #[serde(default)]
        settings: SubmitSettings,
    },
    RunCommand {
        command: String,
    },
    Heartbeat {
        #[serde(rename = "tabId")]
        tab_id: String,
        timestamp: i64,
    },
    GetStatus,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::SubmitFeedback { .. } => "submit_feedback",
            ClientMessage::RunCommand { .. } => "run_command",
            ClientMessage::Heartbeat { .. } => "heartbeat",
            ClientMessage::GetStatus => "get_status",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|err| ProtocolError::Encode(err.to_string()))
    }
}

/// An image already encoded by the (external) upload widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub name: String,
    /// Base64 payload.
    pub data: String,
    pub size: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitSettings {
    #[serde(default)]
    pub image_size_limit: u64,
    #[serde(default)]
    pub enable_base64_detail: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Server → Client
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished,
    HeartbeatResponse,
    CommandOutput {
        output: String,
    },
    CommandComplete {
        exit_code: i32,
    },
    CommandError {
        error: String,
    },
    FeedbackReceived {
        #[serde(default)]
        message: Option<String>,
    },
    StatusUpdate {
        status_info: StatusInfo,
    },
    SessionUpdated {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        session_info: Option<SessionInfo>,
    },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::ConnectionEstablished => "connection_established",
            ServerMessage::HeartbeatResponse => "heartbeat_response",
            ServerMessage::CommandOutput { .. } => "command_output",
            ServerMessage::CommandComplete { .. } => "command_complete",
            ServerMessage::CommandError { .. } => "command_error",
            ServerMessage::FeedbackReceived { .. } => "feedback_received",
            ServerMessage::StatusUpdate { .. } => "status_update",
            ServerMessage::SessionUpdated { .. } => "session_updated",
        }
    }
}

/// Server-side status snapshot. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub project_directory: Option<String>,
    /// Seconds or milliseconds since the epoch; the client normalizes.
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub project_directory: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub created_at: Option<f64>,
}

/// Result of parsing one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ServerMessage),
    Unknown { kind: String },
}

pub fn parse_server_frame(text: &str) -> Result<Inbound, ProtocolError> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    let value: Value =
        serde_json::from_str(text).map_err(|err| ProtocolError::MalformedFrame(err.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    if !KNOWN_SERVER_TYPES.contains(&kind.as_str()) {
        return Ok(Inbound::Unknown { kind });
    }

    serde_json::from_value::<ServerMessage>(value)
        .map(Inbound::Message)
        .map_err(|err| ProtocolError::InvalidPayload {
            kind,
            details: err.to_string(),
        })
}
