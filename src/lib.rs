//! Plexer: protocol-sniffing TCP multiplexer
//!
//! Plexer accepts TCP clients on a single port, looks at the first bytes each
//! client sends and forwards the connection to the backend whose prefix
//! matches. Bytes are relayed unmodified in both directions until either side
//! closes.
//!
//! # Main Features
//!
//! - Case-insensitive text prefixes and exact raw byte prefixes
//! - Ordered route table, first match wins
//! - Bounded number of concurrently active connections
//! - Layered configuration (defaults, file, environment, command line)
//!
//! # Example
//!
//! ```no_run
//! use plexer::{bind_listener, parse_socket_addr, Multiplexer, Result};
//! use plexer::protocol::{Route, RouteTable};
//! use plexer::proxy::ConnectionOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let routes = RouteTable::new(vec![
//!         Route::keyword("SSH-", "127.0.0.1:22"),
//!         Route::raw(&[0x16, 0x03], "127.0.0.1:8443"),
//!         Route::keyword("GET", "127.0.0.1:8000"),
//!     ]);
//!
//!     let listener = bind_listener(parse_socket_addr(":8080")?)?;
//!     let mux = Multiplexer::new(routes, 1024, ConnectionOptions::default());
//!
//!     mux.serve(listener).await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod protocol;
pub mod proxy;

// Re-export commonly used structures and functions for convenience
pub use common::{bind_listener, parse_socket_addr, PlexerError, Result};
pub use config::Settings;
pub use proxy::Multiplexer;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
