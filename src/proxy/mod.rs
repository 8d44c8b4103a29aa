//! Multiplexer service module
//!
//! This module implements the runtime side of the multiplexer: admission
//! control, the accept loop, per-connection protocol detection and the two
//! byte pumps that run once a backend is chosen.
//!
//! Every connection is independent. The only state shared between them is the
//! immutable route table and the admission gate.

mod connection;
mod error;
mod forwarder;
mod gate;
pub mod server;

pub use connection::{Connection, ConnectionOptions, ConnectionReport, ConnectionState, Teardown};
pub use error::ConnectionError;
pub use forwarder::{Direction, IdleTimer, Pump, PumpEnd};
pub use gate::{ActiveSlot, AdmissionGate, AdmissionPermit};
pub use server::Multiplexer;
