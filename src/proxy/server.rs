//! Multiplexer server module
//!
//! This module owns the accept loop: it takes an admission permit, accepts
//! the next client and hands it to its own connection task. Failures inside a
//! connection never reach the loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use super::connection::{Connection, ConnectionOptions, ConnectionReport};
use super::gate::AdmissionGate;
use crate::common::Result;
use crate::config::Settings;
use crate::protocol::RouteTable;

/// Pause after a failed accept so a persistent error does not spin the loop
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Protocol-sniffing TCP multiplexer
///
/// Cloning is cheap; clones share the route table and the admission gate.
#[derive(Debug, Clone)]
pub struct Multiplexer {
    /// Ordered routes consulted once per connection
    routes: Arc<RouteTable>,
    /// Bound on simultaneously active connections
    gate: AdmissionGate,
    /// Per-connection tunables
    options: Arc<ConnectionOptions>,
}

impl Multiplexer {
    /// Create a multiplexer
    ///
    /// # Example
    ///
    /// ```
    /// use plexer::proxy::{ConnectionOptions, Multiplexer};
    /// use plexer::protocol::{Route, RouteTable};
    ///
    /// let routes = RouteTable::new(vec![Route::keyword("GET", "127.0.0.1:8000")]);
    /// let mux = Multiplexer::new(routes, 64, ConnectionOptions::default());
    /// assert_eq!(mux.gate().max_connections(), 64);
    /// ```
    pub fn new(routes: RouteTable, max_connections: usize, options: ConnectionOptions) -> Self {
        Self {
            routes: Arc::new(routes),
            gate: AdmissionGate::new(max_connections),
            options: Arc::new(options),
        }
    }

    /// Create a multiplexer from validated settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            RouteTable::from_services(&settings.services),
            settings.server.max_connections,
            ConnectionOptions::from(&settings.server),
        )
    }

    /// Route table
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Admission gate
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Connection tunables
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Serve clients until the task is cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve clients until `shutdown` completes
    ///
    /// No client is accepted while the gate is full; the loop waits for a
    /// free slot before calling `accept`. On shutdown the listener is closed
    /// and connections still in flight are aborted: their tasks are cancelled,
    /// which closes both streams and frees their slots.
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let local_addr = listener.local_addr()?;
        info!(
            "Multiplexer listening on {} with {} routes (max {} connections)",
            local_addr,
            self.routes.len(),
            self.gate.max_connections()
        );
        for route in self.routes.routes() {
            debug!("Route: {}", route);
        }

        let mut tasks = JoinSet::new();

        loop {
            // Reap finished connection tasks
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    error!("Connection task failed: {}", e);
                }
            }

            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.gate.admit() => permit,
            };

            let (client, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Error accepting connection: {}", e);
                        drop(permit);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
            };

            let connection = Connection::new(
                client,
                peer,
                Arc::clone(&self.routes),
                Arc::clone(&self.options),
            );
            let slot = permit.occupy();
            debug!(
                "Accepted connection #{} from {} ({} active)",
                connection.id(),
                peer,
                self.gate.active()
            );

            tasks.spawn(async move {
                let report = connection.run().await;
                drop(slot);
                log_report(&report);
            });
        }

        info!(
            "Multiplexer on {} shutting down, dropping {} connections",
            local_addr,
            tasks.len()
        );
        tasks.shutdown().await;

        Ok(())
    }
}

/// Log how a connection ended
fn log_report(report: &ConnectionReport) {
    let route = report
        .route
        .as_ref()
        .map(|route| route.to_string())
        .unwrap_or_else(|| "no route".to_string());

    match &report.error {
        Some(err) if err.is_dial_failure() => warn!(
            "Connection #{} from {} ({}): {}",
            report.id, report.peer, route, err
        ),
        Some(err) => debug!(
            "Connection #{} from {} ({}) closed after {} bytes in, {} bytes out: {}",
            report.id, report.peer, route, report.to_backend, report.to_client, err
        ),
        None => debug!(
            "Connection #{} from {} ({}) closed after {} bytes in, {} bytes out",
            report.id, report.peer, route, report.to_backend, report.to_client
        ),
    }
}
