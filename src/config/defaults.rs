//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde and the CLI.

/// Environment variable prefix for all configuration options
///
/// `PLEXER_SERVER__MAX_CONNECTIONS=64` sets `server.max_connections`.
pub const ENV_PREFIX: &str = "PLEXER";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Settings file read when none is given explicitly
pub const DEFAULT_SETTINGS_FILE: &str = "settings.yaml";

/// Default listen address as string
pub const LISTEN_STR: &str = "0.0.0.0:8080";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default listen address
pub fn listen() -> String {
    LISTEN_STR.to_string()
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default cap on concurrently active connections
pub fn max_connections() -> usize {
    1024
}

/// Default per-direction copy buffer (512 KiB)
pub fn buffer_size() -> usize {
    512 * 1024
}
