//! Protocol detector implementation
//!
//! This module picks a backend by comparing the first bytes a client sends
//! against an ordered table of prefixes. Detection is a pure function over a
//! byte slice: it never reads from the socket itself, so the caller decides
//! which bytes count as "the first read".

use std::fmt;

use bytes::Bytes;
use log::trace;
use thiserror::Error;

use crate::config::ServiceEntry;

/// No route matched the inspected bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no route matches the first {inspected} bytes")]
pub struct NoMatch {
    /// Number of bytes that were inspected
    pub inspected: usize,
}

/// One entry of the route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Protocol label for log lines
    kind: String,
    /// Prefix compared ASCII case-insensitively
    keyword: Bytes,
    /// Prefix compared byte for byte
    keyword_bytes: Bytes,
    /// Backend `host:port`
    location: String,
}

impl Route {
    /// Create a route from its parts
    ///
    /// Empty prefixes are treated as absent. A route with no prefix at all
    /// never matches.
    pub fn new(
        kind: impl Into<String>,
        keyword: impl Into<Bytes>,
        keyword_bytes: impl Into<Bytes>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            keyword: keyword.into(),
            keyword_bytes: keyword_bytes.into(),
            location: location.into(),
        }
    }

    /// Route with only a case-insensitive keyword
    pub fn keyword(keyword: &str, location: impl Into<String>) -> Self {
        Self::new("", Bytes::copy_from_slice(keyword.as_bytes()), Bytes::new(), location)
    }

    /// Route with only a raw byte prefix
    pub fn raw(keyword_bytes: &[u8], location: impl Into<String>) -> Self {
        Self::new("", Bytes::new(), Bytes::copy_from_slice(keyword_bytes), location)
    }

    /// Protocol label
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Backend address
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Check whether `data` starts with one of this route's prefixes
    ///
    /// A buffer shorter than a prefix never matches it, even when it is a
    /// prefix of the prefix.
    pub fn matches(&self, data: &[u8]) -> bool {
        let keyword = self.keyword.as_ref();
        let text_match = !keyword.is_empty()
            && data.len() >= keyword.len()
            && data[..keyword.len()].eq_ignore_ascii_case(keyword);

        text_match || (!self.keyword_bytes.is_empty() && data.starts_with(&self.keyword_bytes))
    }
}

impl From<&ServiceEntry> for Route {
    fn from(entry: &ServiceEntry) -> Self {
        Self::new(
            entry.kind.clone(),
            Bytes::copy_from_slice(entry.keyword.as_bytes()),
            Bytes::copy_from_slice(&entry.keyword_bytes),
            entry.location.clone(),
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_empty() {
            write!(f, "{}", self.location)
        } else {
            write!(f, "{} -> {}", self.kind, self.location)
        }
    }
}

/// Ordered route table
///
/// Order is significant: earlier entries shadow later ones. The table is
/// immutable once built and is shared between connections behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a table from routes in match order
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Build a table from the configured services
    pub fn from_services(services: &[ServiceEntry]) -> Self {
        Self::new(services.iter().map(Route::from).collect())
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes in match order
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find the backend for a connection's first bytes
    ///
    /// Returns the first route whose prefix matches `data`. Only the bytes
    /// passed in are considered; a prefix split over two reads is not
    /// reassembled by the caller and therefore does not match.
    pub fn detect(&self, data: &[u8]) -> Result<&Route, NoMatch> {
        let found = self.routes.iter().find(|route| route.matches(data));

        match found {
            Some(route) => {
                trace!("Detected {} from {} leading bytes", route, data.len());
                Ok(route)
            }
            None => Err(NoMatch { inspected: data.len() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new(vec![
            Route::new("http", &b"GET"[..], &b""[..], "127.0.0.1:9000"),
            Route::new("tls", &b""[..], Bytes::from_static(&[0x16, 0x03]), "127.0.0.1:9443"),
            Route::new("ssh", &b"SSH-"[..], &b""[..], "127.0.0.1:22"),
        ])
    }

    #[test]
    fn test_keyword_case_insensitive() {
        let table = table();

        assert_eq!(table.detect(b"GET / HTTP/1.1\r\n").unwrap().location(), "127.0.0.1:9000");
        assert_eq!(table.detect(b"get / HTTP/1.1\r\n").unwrap().location(), "127.0.0.1:9000");
        assert_eq!(table.detect(b"gEt").unwrap().location(), "127.0.0.1:9000");
    }

    #[test]
    fn test_raw_bytes_exact() {
        let table = table();

        let client_hello = [0x16, 0x03, 0x01, 0x00, 0xa5, 0x01];
        assert_eq!(table.detect(&client_hello).unwrap().kind(), "tls");

        assert!(table.detect(&[0x16, 0x04]).is_err());
    }

    #[test]
    fn test_raw_bytes_are_case_sensitive() {
        let table = RouteTable::new(vec![Route::raw(b"PING", "127.0.0.1:1")]);

        assert!(table.detect(b"PING\r\n").is_ok());
        assert!(table.detect(b"ping\r\n").is_err());
    }

    #[test]
    fn test_first_match_wins() {
        let table = RouteTable::new(vec![
            Route::keyword("GET", "127.0.0.1:1"),
            Route::keyword("GET /admin", "127.0.0.1:2"),
        ]);

        assert_eq!(table.detect(b"GET /admin HTTP/1.1").unwrap().location(), "127.0.0.1:1");
    }

    #[test]
    fn test_either_variant_matches() {
        let table = RouteTable::new(vec![Route::new("", &b"abc"[..], Bytes::from_static(&[0xff]), "127.0.0.1:1")]);

        assert!(table.detect(b"ABCdef").is_ok());
        assert!(table.detect(&[0xff, 0x00]).is_ok());
        assert!(table.detect(b"xyz").is_err());
    }

    #[test]
    fn test_no_partial_prefix_match() {
        let table = table();

        assert_eq!(table.detect(b"GE"), Err(NoMatch { inspected: 2 }));
        assert_eq!(table.detect(b"SSH"), Err(NoMatch { inspected: 3 }));
        assert!(table.detect(&[0x16]).is_err());
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(table().detect(b""), Err(NoMatch { inspected: 0 }));
    }

    #[test]
    fn test_route_without_prefix_never_matches() {
        let table = RouteTable::new(vec![Route::new("", Bytes::new(), Bytes::new(), "127.0.0.1:1")]);

        assert!(table.detect(b"").is_err());
        assert!(table.detect(b"anything").is_err());
    }

    #[test]
    fn test_detect_is_deterministic() {
        let table = table();
        let data = b"SSH-2.0-OpenSSH_9.6\r\n";

        let first = table.detect(data).unwrap().clone();
        for _ in 0..10 {
            assert_eq!(table.detect(data).unwrap(), &first);
        }
    }

    #[test]
    fn test_from_services() {
        let services = vec![
            ServiceEntry {
                kind: "http".to_string(),
                keyword: "get".to_string(),
                keyword_bytes: Vec::new(),
                location: "127.0.0.1:9000".to_string(),
            },
            ServiceEntry {
                kind: "tls".to_string(),
                keyword: String::new(),
                keyword_bytes: vec![0x16, 0x03],
                location: "127.0.0.1:9443".to_string(),
            },
        ];

        let table = RouteTable::from_services(&services);
        assert_eq!(table.len(), 2);
        assert_eq!(table.detect(b"GET /").unwrap().to_string(), "http -> 127.0.0.1:9000");
        assert_eq!(table.detect(&[0x16, 0x03, 0x03]).unwrap().kind(), "tls");
    }
}
