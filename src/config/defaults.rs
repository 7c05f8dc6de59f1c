//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Default number of history entries kept
pub const DEFAULT_RETENTION_LIMIT: usize = 200;

/// Retention limit bounds
pub const MIN_RETENTION_LIMIT: usize = 10;
pub const MAX_RETENTION_LIMIT: usize = 1000;

/// Local query API is opt-in
pub const DEFAULT_LOCAL_API_ENABLED: bool = false;

/// Default local query API port
pub const DEFAULT_LOCAL_API_PORT: u16 = 8899;

/// Local query API port bounds (no privileged ports)
pub const MIN_LOCAL_API_PORT: u16 = 1024;
pub const MAX_LOCAL_API_PORT: u16 = 65535;

/// Directory under $HOME holding the database, images, logs and config
pub const DEFAULT_DATA_DIR_NAME: &str = ".cliphist";

/// Config file name inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.json";
