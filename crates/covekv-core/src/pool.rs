use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use covekv_common::protocol::Result;

use crate::connection::Connection;

/// Bounded connection pool for one remote endpoint.
///
/// The pool hands out idle connections and opens new ones up to
/// `max_connections`; at capacity it signals the caller instead of waiting,
/// so the node can queue or backpressure rather than stall an I/O task.
///
/// # Thread Safety
///
/// The idle set sits behind a mutex that is only held for push/pop; opening
/// a connection happens outside the lock against a reserved slot in the
/// `open` counter.
pub(crate) struct ConnectionPool {
    addr: String,
    min_connections: usize,
    max_connections: usize,
    idle: Mutex<Vec<Connection>>,
    open: AtomicUsize,
}

impl ConnectionPool {
    pub(crate) fn new(addr: String, min_connections: usize, max_connections: usize) -> Self {
        Self {
            addr,
            min_connections,
            max_connections,
            idle: Mutex::new(Vec::new()),
            open: AtomicUsize::new(0),
        }
    }

    /// Acquires a connection.
    ///
    /// Returns an idle connection when one exists (LIFO), otherwise opens a
    /// new one if the pool is below `max_connections`. `Ok(None)` means the
    /// pool is at capacity with nothing idle: a non-blocking signal, not a
    /// wait.
    ///
    /// # Errors
    ///
    /// Returns an error when a new connection cannot be established; the
    /// reserved slot is released first.
    pub(crate) async fn acquire(&self) -> Result<Option<Connection>> {
        if let Some(conn) = self.idle.lock().unwrap().pop() {
            return Ok(Some(conn));
        }

        if !self.reserve_slot() {
            return Ok(None);
        }

        match Connection::open(&self.addr).await {
            Ok(conn) => Ok(Some(conn)),
            Err(err) => {
                self.open.fetch_sub(1, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Returns a connection to the pool.
    ///
    /// Healthy connections go back to the idle set; unhealthy ones are
    /// dropped and their slot freed. A connection that saw any transport or
    /// protocol error must be released unhealthy.
    pub(crate) fn release(&self, conn: Connection, healthy: bool) {
        if healthy {
            self.idle.lock().unwrap().push(conn);
        } else {
            debug!(addr = %self.addr, "discarding unhealthy connection");
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Opens connections until `min_connections` are held.
    ///
    /// A failure is logged and stops the warm-up; the pool recovers lazily
    /// on demand. The slot is claimed only after the connect succeeds, so a
    /// warm-up in progress never makes `acquire` report the pool full while
    /// capacity is actually unused.
    pub(crate) async fn warm_up(&self) {
        while self.open.load(Ordering::SeqCst) < self.min_connections {
            match Connection::open(&self.addr).await {
                Ok(conn) => {
                    if self.reserve_slot() {
                        self.idle.lock().unwrap().push(conn);
                    } else {
                        // Demand filled the pool in the meantime.
                        break;
                    }
                }
                Err(err) => {
                    warn!(addr = %self.addr, error = %err, "connection warm-up failed");
                    break;
                }
            }
        }
    }

    /// Closes all idle connections.
    pub(crate) fn drain(&self) {
        let drained: Vec<Connection> = self.idle.lock().unwrap().drain(..).collect();
        if !drained.is_empty() {
            self.open.fetch_sub(drained.len(), Ordering::SeqCst);
        }
    }

    fn reserve_slot(&self) -> bool {
        self.open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_connections).then_some(n + 1)
            })
            .is_ok()
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}
