//! Error types for feedback-core operations.
//!
//! Public component operations never return these across their boundary; they
//! log and degrade. The enum exists for the internal `?` plumbing underneath
//! (stores, config loading, the HTTP/transport seams implemented by hosts).

use std::path::PathBuf;

/// All errors that can occur inside feedback-core.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("Session not found in history: {0}")]
    SessionNotFound(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to open transport to {url}: {details}")]
    TransportConnect { url: String, details: String },

    #[error("Failed to send on transport: {0}")]
    TransportSend(String),

    #[error("Transport is not connected")]
    NotConnected,

    // ─────────────────────────────────────────────────────────────────────
    // Server API Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("API request failed: {endpoint}: {details}")]
    ApiRequest { endpoint: String, details: String },

    #[error("API returned status {status} for {endpoint}")]
    ApiStatus { endpoint: String, status: u16 },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration read failed: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid server URL {url}: {details}")]
    InvalidServerUrl { url: String, details: String },
}

/// Convenience type alias for Results using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ClientError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        ClientError::Json {
            context: context.into(),
            source,
        }
    }
}

impl From<ClientError> for String {
    fn from(err: ClientError) -> String {
        err.to_string()
    }
}
