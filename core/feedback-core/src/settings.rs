//! User settings as served by `GET /api/load-settings`.
//!
//! Only the fields this client acts on are typed. Everything else the UI
//! stores is carried in `extra` so that a load → save cycle does not drop it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_RETENTION_HOURS: u32 = 72;
pub const DEFAULT_LAYOUT_MODE: &str = "combined-vertical";

/// Zero means "use the default" wherever a retention window is configured.
pub fn effective_retention_hours(hours: u32) -> u32 {
    if hours == 0 {
        DEFAULT_RETENTION_HOURS
    } else {
        hours
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub session_history_retention_hours: u32,
    pub layout_mode: String,
    /// Bytes; 0 means unlimited.
    pub image_size_limit: u64,
    pub enable_base64_detail: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_history_retention_hours: DEFAULT_RETENTION_HOURS,
            layout_mode: DEFAULT_LAYOUT_MODE.to_string(),
            image_size_limit: 0,
            enable_base64_detail: false,
            language: None,
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Retention window with zero treated as "use the default".
    pub fn retention_hours(&self) -> u32 {
        effective_retention_hours(self.session_history_retention_hours)
    }

    pub fn is_combined_layout(&self) -> bool {
        self.layout_mode.starts_with("combined")
    }
}
