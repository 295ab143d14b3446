//! Runtime configuration loaded from `<root>/client.toml`.
//!
//! A missing file yields defaults. `FEEDBACK_SERVER_URL` overrides the server
//! location after the file is read.
//!
//! ```toml
//! server_url = "http://127.0.0.1:8765"
//!
//! [tabs]
//! heartbeat_ms = 5000
//! expiry_ms = 30000
//!
//! [connection]
//! heartbeat_ms = 30000
//! reconnect_delay_ms = 3000
//! max_reconnect_attempts = 10
//!
//! [history]
//! retention_hours = 72
//! ```

use std::env;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::{ClientError, Result};

pub const SERVER_URL_ENV: &str = "FEEDBACK_SERVER_URL";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8765";
const WS_PATH: &str = "/ws";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TabsConfig {
    #[serde(default = "default_tab_heartbeat_ms")]
    pub heartbeat_ms: i64,
    #[serde(default = "default_tab_expiry_ms")]
    pub expiry_ms: i64,
}

impl Default for TabsConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_tab_heartbeat_ms(),
            expiry_ms: default_tab_expiry_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_transport_heartbeat_ms")]
    pub heartbeat_ms: i64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: i64,
    /// `None` retries forever.
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_transport_heartbeat_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub tabs: TabsConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            tabs: TabsConfig::default(),
            connection: ConnectionConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_tab_heartbeat_ms() -> i64 {
    5_000
}

fn default_tab_expiry_ms() -> i64 {
    30_000
}

fn default_transport_heartbeat_ms() -> i64 {
    30_000
}

fn default_reconnect_delay_ms() -> i64 {
    3_000
}

fn default_retention_hours() -> u32 {
    crate::settings::DEFAULT_RETENTION_HOURS
}

impl ClientConfig {
    /// Reads `path`, falling back to defaults when it does not exist, then
    /// applies the environment override.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs_err::read_to_string(path).map_err(|source| ClientError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<ClientConfig>(&content).map_err(|err| {
                ClientError::ConfigMalformed {
                    path: path.to_path_buf(),
                    details: err.to_string(),
                }
            })?
        } else {
            ClientConfig::default()
        };

        if let Ok(url) = env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                config.server_url = url.trim().to_string();
            }
        }

        Ok(config)
    }

    /// Socket endpoint for the configured server: scheme mapped `http→ws`,
    /// `https→wss`, path replaced with `/ws`.
    pub fn websocket_url(&self) -> Result<String> {
        websocket_url_for(&self.server_url)
    }

    /// Base URL for REST calls, without a trailing slash.
    pub fn http_base(&self) -> Result<String> {
        let url = parse_server_url(&self.server_url)?;
        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}

fn parse_server_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|err| ClientError::InvalidServerUrl {
        url: raw.to_string(),
        details: err.to_string(),
    })?;
    if url.host_str().is_none() {
        return Err(ClientError::InvalidServerUrl {
            url: raw.to_string(),
            details: "missing host".to_string(),
        });
    }
    Ok(url)
}

pub fn websocket_url_for(server_url: &str) -> Result<String> {
    let mut url = parse_server_url(server_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::InvalidServerUrl {
                url: server_url.to_string(),
                details: format!("unsupported scheme {}", other),
            })
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ClientError::InvalidServerUrl {
            url: server_url.to_string(),
            details: format!("cannot switch scheme to {}", scheme),
        })?;
    url.set_path(WS_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}
