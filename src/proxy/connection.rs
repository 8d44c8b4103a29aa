//! Client connection lifecycle
//!
//! A connection moves through three states:
//!
//! * `AwaitingBackend`: the first client read is matched against the route
//!   table, exactly once. On a match the backend is dialed and the bytes
//!   already read are forwarded to it.
//! * `Proxying`: an inbound and an outbound pump copy bytes concurrently.
//! * `Closed`: terminal. Entered by whichever side stops first; the other
//!   pump is woken and both streams are released.
//!
//! The backend read half is handed to the outbound pump through a one-shot
//! channel, so it is published once and never replaced.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;

use super::error::ConnectionError;
use super::forwarder::{Direction, IdleTimer, Pump, PumpEnd};
use crate::config::ServerSettings;
use crate::protocol::{Route, RouteTable};

/// Global connection ID counter
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the first client bytes and the backend dial
    AwaitingBackend,
    /// Both pumps are running
    Proxying,
    /// Torn down; no further I/O happens
    Closed,
}

impl ConnectionState {
    /// Whether the connection has been torn down
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingBackend => write!(f, "awaiting-backend"),
            Self::Proxying => write!(f, "proxying"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Shared state and one-time teardown signal of a connection
///
/// Both pumps and the owning task hold it. [`Teardown::close`] may be called
/// any number of times from any task; only the first call has an effect.
#[derive(Debug)]
pub struct Teardown {
    state: watch::Sender<ConnectionState>,
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

impl Teardown {
    /// Fresh signal in `AwaitingBackend`
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::AwaitingBackend);
        Self { state }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move from `AwaitingBackend` to `Proxying`
    ///
    /// Returns `false` if the connection was already closed.
    pub fn begin_proxying(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::AwaitingBackend {
                *state = ConnectionState::Proxying;
                true
            } else {
                false
            }
        })
    }

    /// Enter `Closed` and wake everyone waiting in [`Teardown::closed`]
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_closed() {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        })
    }

    /// Wait until the connection is closed
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        // The sender lives in `self`, so the wait cannot fail
        let _ = state.wait_for(|state| state.is_closed()).await;
    }
}

/// Tunables shared by every connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Size of each per-direction copy buffer
    pub buffer_size: usize,
    /// Limit for the backend dial
    pub connect_timeout: Option<Duration>,
    /// Limit on how long neither direction may carry traffic
    pub idle_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ConnectionOptions {
    fn from(server: &ServerSettings) -> Self {
        Self {
            buffer_size: server.buffer_size.max(1),
            connect_timeout: server.connect_timeout(),
            idle_timeout: server.idle_timeout(),
        }
    }
}

/// What happened to a finished connection
#[derive(Debug)]
pub struct ConnectionReport {
    /// Connection ID
    pub id: u64,
    /// Client address
    pub peer: SocketAddr,
    /// Matched route, if detection succeeded
    pub route: Option<Route>,
    /// Bytes written to the backend
    pub to_backend: u64,
    /// Bytes written to the client
    pub to_client: u64,
    /// The failure that ended the connection, if it did not end cleanly
    pub error: Option<ConnectionError>,
}

/// One accepted client
pub struct Connection {
    id: u64,
    peer: SocketAddr,
    client: TcpStream,
    routes: Arc<RouteTable>,
    options: Arc<ConnectionOptions>,
    teardown: Teardown,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.teardown.state())
            .finish()
    }
}

impl Connection {
    /// Wrap an accepted client stream
    pub fn new(
        client: TcpStream,
        peer: SocketAddr,
        routes: Arc<RouteTable>,
        options: Arc<ConnectionOptions>,
    ) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            client,
            routes,
            options,
            teardown: Teardown::new(),
        }
    }

    /// Connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Drive the connection until it is closed
    ///
    /// Both pumps run inside the calling task. Returns once both have stopped
    /// and both streams are released; cancelling the returned future drops
    /// the streams immediately.
    pub async fn run(self) -> ConnectionReport {
        let Connection {
            id,
            peer,
            client,
            routes,
            options,
            teardown,
        } = self;

        debug!("Connection #{} from {}: awaiting first bytes", id, peer);

        let idle = options.idle_timeout.map(|limit| Arc::new(IdleTimer::new(limit)));
        let (client_reader, client_writer) = client.into_split();
        let (backend_tx, backend_rx) = oneshot::channel();

        let (inbound, (to_client, outbound_result)) = tokio::join!(
            inbound_pump(
                id,
                client_reader,
                backend_tx,
                &routes,
                &options,
                Pump::new(Direction::Inbound, idle.clone()),
                &teardown,
            ),
            outbound_pump(
                client_writer,
                backend_rx,
                &options,
                Pump::new(Direction::Outbound, idle),
                &teardown,
            ),
        );
        teardown.close();

        ConnectionReport {
            id,
            peer,
            route: inbound.route,
            to_backend: inbound.transferred,
            to_client,
            error: inbound.result.err().or_else(|| outbound_result.err()),
        }
    }
}

/// Result of the client-to-backend side
struct InboundOutcome {
    route: Option<Route>,
    transferred: u64,
    result: Result<PumpEnd, ConnectionError>,
}

/// Backend chosen by the first read
struct Established {
    first_len: usize,
    route: Route,
    backend: TcpStream,
}

/// `AwaitingBackend`: one read, one detection, one dial
///
/// Whatever the first read returns is all detection ever sees.
async fn establish(
    pump: &Pump,
    client: &mut OwnedReadHalf,
    buf: &mut [u8],
    routes: &RouteTable,
    options: &ConnectionOptions,
) -> Result<Established, ConnectionError> {
    let first_len = pump.read(client, buf).await?;
    if first_len == 0 {
        return Err(ConnectionError::ClientClosed);
    }

    let route = routes.detect(&buf[..first_len])?.clone();
    let backend = dial(route.location(), options.connect_timeout).await?;

    Ok(Established {
        first_len,
        route,
        backend,
    })
}

/// Connect to a backend, bounded by `connect_timeout` when set
async fn dial(location: &str, connect_timeout: Option<Duration>) -> Result<TcpStream, ConnectionError> {
    let connect = TcpStream::connect(location);
    let stream = match connect_timeout {
        Some(limit) => timeout(limit, connect)
            .await
            .map_err(|_| ConnectionError::DialTimeout {
                location: location.to_string(),
                timeout: limit,
            })?,
        None => connect.await,
    };

    stream.map_err(|source| ConnectionError::Dial {
        location: location.to_string(),
        source,
    })
}

/// Client to backend; also performs detection and the dial
async fn inbound_pump(
    id: u64,
    mut client: OwnedReadHalf,
    backend_tx: oneshot::Sender<OwnedReadHalf>,
    routes: &RouteTable,
    options: &ConnectionOptions,
    mut pump: Pump,
    teardown: &Teardown,
) -> InboundOutcome {
    let mut buf = vec![0u8; options.buffer_size];
    let mut route = None;

    let result: Result<PumpEnd, ConnectionError> = async {
        let established = tokio::select! {
            biased;
            _ = teardown.closed() => return Ok(PumpEnd::Closed),
            established = establish(&pump, &mut client, &mut buf, routes, options) => established?,
        };

        debug!("Connection #{}: matched {}", id, established.route);
        route = Some(established.route);

        let (backend_reader, mut backend_writer) = established.backend.into_split();
        if backend_tx.send(backend_reader).is_err() || !teardown.begin_proxying() {
            return Ok(PumpEnd::Closed);
        }

        tokio::select! {
            biased;
            _ = teardown.closed() => return Ok(PumpEnd::Closed),
            written = pump.write(&mut backend_writer, &buf[..established.first_len]) => written?,
        }

        pump.run(&mut client, &mut backend_writer, &mut buf, teardown).await
    }
    .await;

    teardown.close();

    InboundOutcome {
        route,
        transferred: pump.transferred(),
        result,
    }
}

/// Backend to client; idle until the backend is published
async fn outbound_pump(
    mut client: OwnedWriteHalf,
    backend_rx: oneshot::Receiver<OwnedReadHalf>,
    options: &ConnectionOptions,
    mut pump: Pump,
    teardown: &Teardown,
) -> (u64, Result<PumpEnd, ConnectionError>) {
    let result: Result<PumpEnd, ConnectionError> = async {
        let mut backend = tokio::select! {
            biased;
            _ = teardown.closed() => return Ok(PumpEnd::Closed),
            backend = backend_rx => match backend {
                Ok(backend) => backend,
                // Detection or dial failed; nothing will ever be published
                Err(_) => return Ok(PumpEnd::Closed),
            },
        };

        let mut buf = vec![0u8; options.buffer_size];
        pump.run(&mut backend, &mut client, &mut buf, teardown).await
    }
    .await;

    teardown.close();

    (pump.transferred(), result)
}
