//! Configuration errors
//!
//! This module defines error types for the configuration module.

use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A settings source could not be read or deserialized
    #[error("Error loading configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// Invalid value for configuration option
    #[error("Invalid value for '{0}': {1}")]
    InvalidValue(String, String),

    /// Missing required configuration value
    #[error("Missing required configuration value: {0}")]
    MissingRequiredValue(String),

    /// Invalid combination of configuration options
    #[error("Invalid combination of configuration options: {0}")]
    InvalidCombination(String),
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

// Convert to crate's common error type
impl From<ConfigError> for crate::common::PlexerError {
    fn from(err: ConfigError) -> Self {
        crate::common::PlexerError::Config(err.to_string())
    }
}
