//! Configuration module - Application settings and user preferences
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.cliphist/config.json
//! - Default values and bounds for all settings
//! - The `SettingsProvider` view the rest of the app reads through
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Configuration struct definitions and clamping
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

// Re-export defaults that are used externally
pub use defaults::{
    DEFAULT_LOCAL_API_PORT, DEFAULT_RETENTION_LIMIT, MAX_LOCAL_API_PORT, MAX_RETENTION_LIMIT,
    MIN_LOCAL_API_PORT, MIN_RETENTION_LIMIT,
};

// Re-export types that are used externally
pub use types::{clamp_port, clamp_retention_limit, default_data_dir, Config, SettingsProvider};

// Re-export loader
pub use loader::{config_path, load_config, load_config_from};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
