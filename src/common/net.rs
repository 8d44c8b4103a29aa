//! Network utility functions
//!
//! This module provides utility functions for network operations.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

use super::error::{PlexerError, Result};

/// Listen backlog used for the multiplexer socket
pub const LISTEN_BACKLOG: i32 = 1024;

/// Parse a socket address
///
/// Accepts the `:port` shorthand, meaning every IPv4 interface.
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    let addr = addr.trim();
    let expanded;
    let addr = if addr.starts_with(':') {
        expanded = format!("0.0.0.0{}", addr);
        expanded.as_str()
    } else {
        addr
    };

    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    // Try using ToSocketAddrs trait
    match addr.to_socket_addrs() {
        Ok(mut addrs) => {
            if let Some(addr) = addrs.next() {
                Ok(addr)
            } else {
                Err(PlexerError::Config(format!("Failed to parse address: {}", addr)))
            }
        }
        Err(e) => Err(PlexerError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Bind the listening socket
///
/// The socket is created with `SO_REUSEADDR` so a restarted multiplexer can
/// take its port back while old connections sit in `TIME_WAIT`.
/// Must be called from within a tokio runtime.
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let bind_err = |source| PlexerError::Bind { address: addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

    TcpListener::from_std(socket.into()).map_err(bind_err)
}
