//! Admission control
//!
//! Bounds the number of connections that are alive at the same time. The
//! accept loop reserves a slot before accepting and turns the reservation
//! into an [`ActiveSlot`] once a client is handed to its connection task.
//! Only active slots are counted; a reservation waiting in `accept` is not a
//! connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate for concurrently active connections
///
/// The count starts at zero when the gate is created and only changes by
/// occupying and releasing slots.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    /// One permit per free connection slot
    semaphore: Arc<Semaphore>,
    /// Slots held by running connections
    active: Arc<AtomicUsize>,
    /// Configured capacity
    max_connections: usize,
}

/// A reserved connection slot that no connection uses yet
///
/// Dropping it frees the slot without ever touching the active count.
#[derive(Debug)]
pub struct AdmissionPermit {
    permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

/// A slot held by a running connection
///
/// Being a move-only value it can only be dropped once, so the active count
/// is decremented exactly once per connection.
#[derive(Debug)]
pub struct ActiveSlot {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl AdmissionGate {
    /// Create a gate admitting at most `max_connections` at a time
    ///
    /// Capacities above [`Semaphore::MAX_PERMITS`] are clamped.
    pub fn new(max_connections: usize) -> Self {
        let max_connections = max_connections.min(Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(max_connections)),
            active: Arc::new(AtomicUsize::new(0)),
            max_connections,
        }
    }

    /// Configured capacity
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Number of running connections
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Reserve a slot if one is free right now
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| self.permit(permit))
    }

    /// Wait until a slot is free and reserve it
    ///
    /// Waiters are served in FIFO order. The task is suspended while the gate
    /// is full; no polling is involved.
    pub async fn admit(&self) -> AdmissionPermit {
        match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => self.permit(permit),
            // The semaphore never leaves this module and is never closed
            Err(_) => unreachable!("admission semaphore closed"),
        }
    }

    fn permit(&self, permit: OwnedSemaphorePermit) -> AdmissionPermit {
        AdmissionPermit {
            permit,
            active: Arc::clone(&self.active),
        }
    }
}

impl AdmissionPermit {
    /// Hand the reserved slot to a connection and count it as active
    pub fn occupy(self) -> ActiveSlot {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveSlot {
            _permit: self.permit,
            active: self.active,
        }
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
