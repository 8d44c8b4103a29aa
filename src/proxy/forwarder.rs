//! Data forwarding module
//!
//! A [`Pump`] copies bytes in one direction until end-of-stream, an I/O
//! error, or connection teardown. Each chunk is written in full before the
//! next read is issued, so bytes leave in the order they arrived.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep_until, Instant};

use super::connection::Teardown;
use super::error::ConnectionError;

/// Direction a pump copies in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to backend
    Inbound,
    /// Backend to client
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "client to backend"),
            Self::Outbound => write!(f, "backend to client"),
        }
    }
}

/// How a pump stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source reached end-of-stream
    Eof,
    /// The connection was torn down elsewhere
    Closed,
}

/// Per-connection inactivity clock
///
/// Both pumps of a connection share one timer. Traffic in either direction
/// pushes the deadline out, so a connection only idles out when neither side
/// has moved a byte for the whole limit.
#[derive(Debug)]
pub struct IdleTimer {
    limit: Duration,
    started: Instant,
    /// Milliseconds after `started` of the latest traffic
    last_activity: AtomicU64,
}

impl IdleTimer {
    /// Start a timer that expires `limit` after the latest activity
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            started: Instant::now(),
            last_activity: AtomicU64::new(0),
        }
    }

    /// Configured limit
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Record traffic now
    pub fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_activity.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Instant at which the connection counts as idle
    pub fn deadline(&self) -> Instant {
        self.started + Duration::from_millis(self.last_activity.load(Ordering::Relaxed)) + self.limit
    }

    /// Whether the deadline has passed
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }
}

/// One-directional copy loop
#[derive(Debug)]
pub struct Pump {
    direction: Direction,
    idle: Option<Arc<IdleTimer>>,
    transferred: u64,
}

impl Pump {
    /// Create a pump for `direction`, optionally bound to the connection's
    /// idle timer
    pub fn new(direction: Direction, idle: Option<Arc<IdleTimer>>) -> Self {
        Self {
            direction,
            idle,
            transferred: 0,
        }
    }

    /// Direction this pump copies in
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Bytes written to the destination so far
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Read the next chunk; `Ok(0)` means end-of-stream
    ///
    /// With an idle timer the read fails once the whole connection has been
    /// silent for the limit, not when this direction alone has been.
    pub async fn read<R>(&self, reader: &mut R, buf: &mut [u8]) -> Result<usize, ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        let direction = self.direction;
        let Some(idle) = &self.idle else {
            return reader
                .read(buf)
                .await
                .map_err(|source| ConnectionError::Read { direction, source });
        };

        loop {
            tokio::select! {
                read = reader.read(buf) => {
                    let n = read.map_err(|source| ConnectionError::Read { direction, source })?;
                    if n > 0 {
                        idle.touch();
                    }
                    return Ok(n);
                }
                _ = sleep_until(idle.deadline()) => {
                    // The other direction may have moved the deadline meanwhile
                    if idle.expired() {
                        return Err(ConnectionError::IdleTimeout { direction, timeout: idle.limit() });
                    }
                }
            }
        }
    }

    /// Write one chunk
    ///
    /// The chunk goes out in full or the pump fails; a partially flushed chunk
    /// is never counted as progress and is not resumed.
    pub async fn write<W>(&mut self, writer: &mut W, chunk: &[u8]) -> Result<(), ConnectionError>
    where
        W: AsyncWrite + Unpin,
    {
        writer
            .write_all(chunk)
            .await
            .map_err(|source| ConnectionError::Write {
                direction: self.direction,
                source,
            })?;

        self.transferred += chunk.len() as u64;
        if let Some(idle) = &self.idle {
            idle.touch();
        }
        trace!("{}: forwarded {} bytes", self.direction, chunk.len());
        Ok(())
    }

    /// Copy until end-of-stream, failure, or teardown
    ///
    /// Teardown wins over pending I/O: once the connection is closed the pump
    /// stops without issuing another read or write.
    pub async fn run<R, W>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        buf: &mut [u8],
        teardown: &Teardown,
    ) -> Result<PumpEnd, ConnectionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let n = tokio::select! {
                biased;
                _ = teardown.closed() => return Ok(PumpEnd::Closed),
                read = self.read(reader, buf) => read?,
            };

            if n == 0 {
                return Ok(PumpEnd::Eof);
            }

            tokio::select! {
                biased;
                _ = teardown.closed() => return Ok(PumpEnd::Closed),
                written = self.write(writer, &buf[..n]) => written?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_pump_copies_until_eof() {
        let (mut source_tx, mut source_rx) = duplex(64);
        let (mut sink_tx, mut sink_rx) = duplex(1024);
        let teardown = Teardown::new();

        source_tx.write_all(b"hello ").await.unwrap();
        source_tx.write_all(b"world").await.unwrap();
        drop(source_tx);

        let mut pump = Pump::new(Direction::Inbound, None);
        let mut buf = vec![0u8; 4];
        let end = pump.run(&mut source_rx, &mut sink_tx, &mut buf, &teardown).await.unwrap();
        drop(sink_tx);

        assert_eq!(end, PumpEnd::Eof);
        assert_eq!(pump.transferred(), 11);

        let mut received = Vec::new();
        sink_rx.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello world");
    }

    #[tokio::test]
    async fn test_pump_stops_on_teardown() {
        let (_source_tx, mut source_rx) = duplex(64);
        let (mut sink_tx, _sink_rx) = duplex(64);
        let teardown = std::sync::Arc::new(Teardown::new());

        let closer = {
            let teardown = std::sync::Arc::clone(&teardown);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                teardown.close();
            })
        };

        let mut pump = Pump::new(Direction::Outbound, None);
        let mut buf = vec![0u8; 16];
        let end = timeout(
            Duration::from_secs(1),
            pump.run(&mut source_rx, &mut sink_tx, &mut buf, &teardown),
        )
        .await
        .expect("pump should notice teardown")
        .unwrap();

        assert_eq!(end, PumpEnd::Closed);
        assert_eq!(pump.transferred(), 0);
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn test_pump_idle_timeout() {
        let (_source_tx, mut source_rx) = duplex(64);
        let (mut sink_tx, _sink_rx) = duplex(64);
        let teardown = Teardown::new();

        let idle = Arc::new(IdleTimer::new(Duration::from_millis(20)));
        let mut pump = Pump::new(Direction::Inbound, Some(idle));
        let mut buf = vec![0u8; 16];
        let result = pump.run(&mut source_rx, &mut sink_tx, &mut buf, &teardown).await;

        assert!(matches!(
            result,
            Err(ConnectionError::IdleTimeout { direction: Direction::Inbound, .. })
        ));
    }

    #[tokio::test]
    async fn test_traffic_elsewhere_keeps_pump_alive() {
        let (_source_tx, mut source_rx) = duplex(64);
        let (mut sink_tx, _sink_rx) = duplex(64);
        let teardown = Teardown::new();
        let idle = Arc::new(IdleTimer::new(Duration::from_millis(60)));

        // Stands in for the opposite direction moving bytes
        let other_side = {
            let idle = Arc::clone(&idle);
            tokio::spawn(async move {
                for _ in 0..10 {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    idle.touch();
                }
            })
        };

        let started = Instant::now();
        let mut pump = Pump::new(Direction::Inbound, Some(Arc::clone(&idle)));
        let mut buf = vec![0u8; 16];
        let result = pump.run(&mut source_rx, &mut sink_tx, &mut buf, &teardown).await;

        assert!(matches!(result, Err(ConnectionError::IdleTimeout { .. })));
        assert!(
            started.elapsed() >= Duration::from_millis(200),
            "silent direction timed out after {:?} while the other side was active",
            started.elapsed()
        );
        other_side.await.unwrap();
    }

    #[test]
    fn test_idle_timer_touch_moves_deadline() {
        let idle = IdleTimer::new(Duration::from_secs(30));
        let first = idle.deadline();

        std::thread::sleep(Duration::from_millis(5));
        idle.touch();

        assert!(idle.deadline() > first);
        assert!(!idle.expired());
    }

    #[tokio::test]
    async fn test_pump_write_failure() {
        let (mut source_tx, mut source_rx) = duplex(64);
        let (mut sink_tx, sink_rx) = duplex(64);
        let teardown = Teardown::new();

        drop(sink_rx);
        source_tx.write_all(b"data").await.unwrap();

        let mut pump = Pump::new(Direction::Outbound, None);
        let mut buf = vec![0u8; 16];
        let result = pump.run(&mut source_rx, &mut sink_tx, &mut buf, &teardown).await;

        assert!(matches!(
            result,
            Err(ConnectionError::Write { direction: Direction::Outbound, .. })
        ));
        assert_eq!(pump.transferred(), 0);
    }
}
