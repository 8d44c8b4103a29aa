//! Connection-level errors
//!
//! Every variant ends exactly one connection. None of them reach the accept
//! loop or other connections.

use std::io;
use std::time::Duration;

use thiserror::Error;

use super::forwarder::Direction;
use crate::protocol::NoMatch;

/// Reason a connection was torn down abnormally
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The first bytes did not match any route; no backend was dialed
    #[error(transparent)]
    NoMatch(#[from] NoMatch),

    /// The client closed before sending anything
    #[error("client closed before sending any data")]
    ClientClosed,

    /// The backend refused or could not be reached
    #[error("failed to dial backend {location}: {source}")]
    Dial {
        /// Backend address
        location: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// The backend did not answer the dial in time
    #[error("timed out after {timeout:?} dialing backend {location}")]
    DialTimeout {
        /// Backend address
        location: String,
        /// Configured limit
        timeout: Duration,
    },

    /// No data arrived within the idle limit
    #[error("{direction} idle for more than {timeout:?}")]
    IdleTimeout {
        /// Pump that timed out
        direction: Direction,
        /// Configured limit
        timeout: Duration,
    },

    /// Reading failed
    #[error("{direction} read failed: {source}")]
    Read {
        /// Pump that failed
        direction: Direction,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// A chunk could not be written in full
    #[error("{direction} write failed: {source}")]
    Write {
        /// Pump that failed
        direction: Direction,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    /// Whether a backend dial was attempted and failed
    pub fn is_dial_failure(&self) -> bool {
        matches!(self, Self::Dial { .. } | Self::DialTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_display() {
        let err: ConnectionError = NoMatch { inspected: 4 }.into();
        assert_eq!(err.to_string(), "no route matches the first 4 bytes");
        assert!(!err.is_dial_failure());
    }

    #[test]
    fn test_direction_in_message() {
        let err = ConnectionError::Write {
            direction: Direction::Outbound,
            source: io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
        };
        assert_eq!(err.to_string(), "backend to client write failed: broken pipe");
    }

    #[test]
    fn test_dial_failure() {
        let err = ConnectionError::DialTimeout {
            location: "10.0.0.1:22".to_string(),
            timeout: Duration::from_secs(3),
        };
        assert!(err.is_dial_failure());
        assert!(err.to_string().contains("10.0.0.1:22"));
    }
}
