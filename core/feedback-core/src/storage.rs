//! Storage configuration and path management for the feedback client.
//!
//! All on-disk locations are decided here so the rest of the crate never joins
//! paths by hand:
//!
//! - Testability via dependency injection (`StorageConfig::with_root(temp_dir)`)
//! - One override point (`FEEDBACK_HOME`) for running several isolated clients
//!
//! Tabs that should see each other must share the same [`kv_dir`](StorageConfig::kv_dir).

use std::env;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "FEEDBACK_HOME";
const DEFAULT_DIR_NAME: &str = ".mcp-feedback";

/// Central configuration for all feedback client storage paths.
///
/// Production code uses `StorageConfig::default()` which points to `~/.mcp-feedback/`.
/// Tests use `StorageConfig::with_root(temp_dir)` for isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        if let Ok(path) = env::var(HOME_ENV) {
            if !path.trim().is_empty() {
                return Self {
                    root: PathBuf::from(path),
                };
            }
        }

        let home = dirs::home_dir().unwrap_or_else(env::temp_dir);
        Self {
            root: home.join(DEFAULT_DIR_NAME),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to client.toml (runtime configuration).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("client.toml")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    /// Shared key-value directory (one JSON file per key).
    pub fn kv_dir(&self) -> PathBuf {
        self.root.join("kv")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Default destination for history exports.
    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    /// Creates all directories the client writes into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(self.kv_dir())?;
        fs_err::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_sets_custom_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/feedback"));
        assert_eq!(config.root(), Path::new("/tmp/feedback"));
    }

    #[test]
    fn test_file_and_dir_paths() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/feedback"));
        assert_eq!(
            config.config_file(),
            PathBuf::from("/tmp/feedback/client.toml")
        );
        assert_eq!(config.kv_dir(), PathBuf::from("/tmp/feedback/kv"));
        assert_eq!(config.logs_dir(), PathBuf::from("/tmp/feedback/logs"));
        assert_eq!(config.exports_dir(), PathBuf::from("/tmp/feedback/exports"));
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = StorageConfig::with_root(temp_dir.path().join("root"));
        config.ensure_dirs().expect("ensure dirs");
        assert!(config.kv_dir().is_dir());
        assert!(config.logs_dir().is_dir());
    }
}
