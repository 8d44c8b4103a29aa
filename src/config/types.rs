//! Configuration types
//!
//! This module contains the settings consumed at startup: the server block and
//! the ordered list of services that make up the route table.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{parse_socket_addr, Result};
use crate::config::defaults;

/// Listener and connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to accept clients on (`host:port` or `:port`)
    pub listen: String,

    /// Emit debug lines for every connection
    pub debug: bool,

    /// Maximum number of simultaneously active connections
    #[serde(alias = "maxconnections")]
    pub max_connections: usize,

    /// Log level used when `debug` is off
    #[serde(alias = "loglevel")]
    pub log_level: String,

    /// Size of each per-direction copy buffer in bytes
    #[serde(alias = "buffersize")]
    pub buffer_size: usize,

    /// Seconds to wait for a backend dial; unset means no limit
    #[serde(alias = "connecttimeout")]
    pub connect_timeout: Option<u64>,

    /// Seconds without traffic in either direction before the connection is
    /// torn down; unset means no limit
    #[serde(alias = "idletimeout")]
    pub idle_timeout: Option<u64>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            debug: false,
            max_connections: defaults::max_connections(),
            log_level: defaults::log_level(),
            buffer_size: defaults::buffer_size(),
            connect_timeout: None,
            idle_timeout: None,
        }
    }
}

impl ServerSettings {
    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr(&self.listen)
    }

    /// Backend dial timeout
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs)
    }

    /// Per-read idle timeout
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout.map(Duration::from_secs)
    }
}

/// One backend service reachable through the multiplexer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Protocol label, only used in log lines
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Text prefix, compared case-insensitively
    #[serde(default)]
    pub keyword: String,

    /// Raw byte prefix, compared exactly
    #[serde(default, alias = "keywordbytes")]
    pub keyword_bytes: Vec<u8>,

    /// Backend address (`host:port`)
    pub location: String,
}

/// Complete multiplexer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Server block
    pub server: ServerSettings,

    /// Services in match order; the first matching entry wins
    pub services: Vec<ServiceEntry>,
}

impl Settings {
    /// Render the effective settings as pretty JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::common::PlexerError::Config(format!("Failed to render settings: {}", e)))
    }
}
