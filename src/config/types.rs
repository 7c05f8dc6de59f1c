//! Configuration type definitions
//!
//! Raw values are kept as written in the file; clamping and trimming happen
//! when they are read through `SettingsProvider`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::*;

/// Read-only view of user settings
pub trait SettingsProvider {
    /// Maximum number of entries kept, clamped to the allowed range
    fn retention_limit(&self) -> usize;
    /// Bundle identifiers whose copies are never recorded
    fn ignore_list(&self) -> Vec<String>;
    fn local_api_enabled(&self) -> bool;
    /// Query API port, clamped to the allowed range
    fn local_api_port(&self) -> u16;
}

/// Application configuration (`~/.cliphist/config.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Maximum entries kept (default: 200, clamped to 10..=1000)
    #[serde(default = "default_retention_limit")]
    pub retention_limit: i64,
    /// Bundle identifiers to ignore (default: empty)
    #[serde(default)]
    pub ignore_list: Vec<String>,
    /// Serve the local query API (default: false)
    #[serde(default = "default_local_api_enabled")]
    pub local_api_enabled: bool,
    /// Local query API port (default: 8899, clamped to 1024..=65535)
    #[serde(default = "default_local_api_port")]
    pub local_api_port: i64,
    /// Data directory override; `~` is expanded (default: ~/.cliphist)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

fn default_retention_limit() -> i64 {
    DEFAULT_RETENTION_LIMIT as i64
}
fn default_local_api_enabled() -> bool {
    DEFAULT_LOCAL_API_ENABLED
}
fn default_local_api_port() -> i64 {
    DEFAULT_LOCAL_API_PORT as i64
}

impl Default for Config {
    fn default() -> Self {
        Config {
            retention_limit: default_retention_limit(),
            ignore_list: Vec::new(),
            local_api_enabled: DEFAULT_LOCAL_API_ENABLED,
            local_api_port: default_local_api_port(),
            data_dir: None,
        }
    }
}

impl Config {
    /// Resolved data directory
    pub fn data_dir(&self) -> PathBuf {
        match self.data_dir.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => default_data_dir(),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

impl SettingsProvider for Config {
    fn retention_limit(&self) -> usize {
        clamp_retention_limit(self.retention_limit)
    }

    fn ignore_list(&self) -> Vec<String> {
        self.ignore_list
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn local_api_enabled(&self) -> bool {
        self.local_api_enabled
    }

    fn local_api_port(&self) -> u16 {
        clamp_port(self.local_api_port)
    }
}

pub fn clamp_retention_limit(value: i64) -> usize {
    value.clamp(MIN_RETENTION_LIMIT as i64, MAX_RETENTION_LIMIT as i64) as usize
}

pub fn clamp_port(value: i64) -> u16 {
    value.clamp(MIN_LOCAL_API_PORT as i64, MAX_LOCAL_API_PORT as i64) as u16
}

/// `~/.cliphist`, or a relative `.cliphist` when no home directory is known
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR_NAME))
}
