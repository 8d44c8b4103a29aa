//! Common module
//!
//! This module contains shared errors and utility functions used throughout the application.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{PlexerError, Result};
pub use log::{effective_level, init_logger};
pub use net::{bind_listener, parse_socket_addr};
