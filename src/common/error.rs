//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.
//! Errors that belong to a single client connection live in
//! [`crate::proxy::ConnectionError`] and never surface here.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Plexer error type
#[derive(Error, Debug)]
pub enum PlexerError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The listening socket could not be set up
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested
        address: SocketAddr,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `PlexerError`.
pub type Result<T> = std::result::Result<T, PlexerError>;
