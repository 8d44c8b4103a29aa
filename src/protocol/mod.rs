//! Protocol detection module
//!
//! This module maps the leading bytes of a new connection to a backend using
//! an ordered table of static prefixes. There is no per-protocol parsing: a
//! route matches when the client's first read starts with its keyword.

mod detector;

pub use detector::{NoMatch, Route, RouteTable};
