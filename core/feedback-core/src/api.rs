//! REST endpoints the client calls. All of them are best effort: callers log
//! failures and carry on.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::settings::Settings;

pub const REGISTER_TAB_PATH: &str = "/api/register-tab";
pub const CURRENT_SESSION_PATH: &str = "/api/current-session";
pub const LOAD_SETTINGS_PATH: &str = "/api/load-settings";
pub const SAVE_SETTINGS_PATH: &str = "/api/save-settings";

/// Body of `GET /api/current-session`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentSessionInfo {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub project_directory: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl CurrentSessionInfo {
    /// Last path component of the project directory, for titles.
    pub fn project_name(&self) -> Option<&str> {
        self.project_directory
            .as_deref()
            .and_then(|dir| dir.rsplit(|c: char| c == '/' || c == '\\').find(|part| !part.is_empty()))
    }
}

pub trait ServerApi: Send + Sync {
    fn register_tab(&self, tab_id: &str) -> Result<()>;
    fn current_session(&self) -> Result<CurrentSessionInfo>;
    fn load_settings(&self) -> Result<Settings>;
    fn save_settings(&self, settings: &Settings) -> Result<()>;
}
