//! Client-side handle to one store endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use covekv_common::protocol::{CoveError, Result};

use crate::cluster::{is_retryable, ClusterCore};
use crate::connection::Connection;
use crate::events::EventSender;
use crate::operation::{Operation, OperationCodec, OperationFuture, WireOperation};
use crate::pool::ConnectionPool;

/// Lifecycle states of a [`Node`].
///
/// Transitions are monotonic: `Created` → `Running` → `ShuttingDown` →
/// `Shutdown`, never backwards. A node past `Running` executes no new
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeState {
    Created,
    Running,
    ShuttingDown,
    Shutdown,
}

/// Builder for a [`Node`].
pub struct NodeBuilder {
    host: String,
    port: u16,
    min_connections: usize,
    max_connections: usize,
}

impl NodeBuilder {
    pub const DEFAULT_REMOTE_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_REMOTE_PORT: u16 = 8087;
    pub const DEFAULT_MIN_CONNECTIONS: usize = 1;
    pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

    pub fn new() -> Self {
        Self {
            host: Self::DEFAULT_REMOTE_HOST.to_string(),
            port: Self::DEFAULT_REMOTE_PORT,
            min_connections: Self::DEFAULT_MIN_CONNECTIONS,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn with_remote_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_remote_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn build(self) -> Node {
        assert!(self.max_connections >= 1, "max_connections must be at least 1");
        assert!(
            self.min_connections <= self.max_connections,
            "min_connections must not exceed max_connections"
        );

        let addr = format!("{}:{}", self.host, self.port);
        let (state_tx, _) = watch::channel(NodeState::Created);
        Node {
            inner: Arc::new(NodeInner {
                host: self.host,
                port: self.port,
                addr: addr.clone(),
                pool: ConnectionPool::new(addr, self.min_connections, self.max_connections),
                max_inflight: self.max_connections,
                inflight: AtomicUsize::new(0),
                state: Mutex::new(NodeState::Created),
                state_tx,
                events: Mutex::new(None),
                router: Mutex::new(None),
            }),
        }
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of handing an operation to a node.
pub(crate) enum Submission {
    Accepted,
    /// The node is not running or has no capacity; the operation is handed
    /// back untouched so the cluster can route elsewhere or queue it.
    Rejected(Box<dyn WireOperation>),
}

struct NodeInner {
    host: String,
    port: u16,
    addr: String,
    pool: ConnectionPool,
    max_inflight: usize,
    inflight: AtomicUsize,
    state: Mutex<NodeState>,
    state_tx: watch::Sender<NodeState>,
    events: Mutex<Option<EventSender>>,
    router: Mutex<Option<Weak<ClusterCore>>>,
}

/// A node: one remote endpoint, its connection pool, and its lifecycle.
///
/// `Node` is a cheap handle; clones share the same underlying state.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub fn builder() -> NodeBuilder {
        NodeBuilder::new()
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// `host:port` of the remote endpoint.
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn state(&self) -> NodeState {
        *self.inner.state.lock().unwrap()
    }

    /// Count of currently bound (in-flight) operations.
    pub fn inflight_operations(&self) -> usize {
        self.inner.inflight.load(Ordering::SeqCst)
    }

    /// Transitions the node to `Running` and warms the pool up to its
    /// minimum connection count in the background. Warm-up failures are
    /// logged but do not prevent `Running`; the pool recovers on demand.
    pub fn start(&self) {
        if !self.transition(NodeState::Running) {
            return;
        }
        info!(node = %self.addr(), "node running");
        let node = self.clone();
        tokio::spawn(async move {
            node.inner.pool.warm_up().await;
        });
    }

    /// Begins shutdown: no new operations are accepted, in-flight
    /// operations run to completion, and the node reaches `Shutdown` once
    /// drained.
    pub fn shutdown(&self) {
        if self.transition(NodeState::ShuttingDown) {
            info!(node = %self.addr(), "node shutting down");
        }
        self.maybe_finish_shutdown();
    }

    /// Resolves once the node reaches `Shutdown`.
    pub async fn await_shutdown(&self) {
        let mut rx = self.inner.state_tx.subscribe();
        // The node holds its sender for its own lifetime, so wait_for can
        // only fail if the node is dropped while we wait.
        let _ = rx.wait_for(|state| *state == NodeState::Shutdown).await;
    }

    /// Executes an operation directly on this node, bypassing any cluster.
    ///
    /// If the node cannot accept it, the operation's future completes with
    /// [`CoveError::NodeUnavailable`]. Must be called within a Tokio
    /// runtime.
    pub fn execute<C: OperationCodec>(&self, op: Operation<C>) -> OperationFuture<C::Output> {
        let future = op.future();
        if let Submission::Rejected(mut op) = self.submit(Box::new(op)) {
            op.fail_with(CoveError::NodeUnavailable(format!(
                "node {} not accepting operations",
                self.addr()
            )));
        }
        future
    }

    /// Hands a boxed operation to this node.
    ///
    /// Accepted only when the node is `Running` and fewer than
    /// `max_connections` operations are in flight; the capacity reservation
    /// and the state re-check keep a draining node from taking new work.
    pub(crate) fn submit(&self, op: Box<dyn WireOperation>) -> Submission {
        if self.state() != NodeState::Running {
            return Submission::Rejected(op);
        }
        if !self.try_reserve() {
            return Submission::Rejected(op);
        }
        if self.state() != NodeState::Running {
            self.release_slot();
            return Submission::Rejected(op);
        }

        op.mark_bound();
        let node = self.clone();
        tokio::spawn(async move {
            node.run_exchange(op).await;
        });
        Submission::Accepted
    }

    /// Nodes are compared by identity, not by address.
    pub(crate) fn same_node(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wires the node into a cluster: transition events flow to the
    /// cluster's hub, and completions/retries are reported back through the
    /// router.
    pub(crate) fn attach(&self, events: EventSender, router: Weak<ClusterCore>) {
        *self.inner.events.lock().unwrap() = Some(events);
        *self.inner.router.lock().unwrap() = Some(router);
    }

    fn router(&self) -> Option<Arc<ClusterCore>> {
        self.inner
            .router
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Advances the state machine. Backward or repeated transitions are
    /// rejected. The event is emitted while the state lock is held so
    /// listeners observe transitions in order; delivery itself is
    /// asynchronous and never blocks here.
    fn transition(&self, next: NodeState) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        if *state >= next {
            return false;
        }
        *state = next;
        self.inner.state_tx.send_replace(next);
        if let Some(events) = self.inner.events.lock().unwrap().as_ref() {
            events.transition(self.clone(), next);
        }
        true
    }

    fn try_reserve(&self) -> bool {
        self.inner
            .inflight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.inner.max_inflight).then_some(n + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        self.inner.inflight.fetch_sub(1, Ordering::SeqCst);
        self.maybe_finish_shutdown();
    }

    fn maybe_finish_shutdown(&self) {
        if self.state() == NodeState::ShuttingDown
            && self.inner.inflight.load(Ordering::SeqCst) == 0
        {
            self.inner.pool.drain();
            if self.transition(NodeState::Shutdown) {
                info!(node = %self.addr(), "node shut down");
            }
        }
    }

    async fn run_exchange(self, mut op: Box<dyn WireOperation>) {
        // Best-effort: a cancel that raced the dispatch is honored before
        // any bytes hit the wire.
        if op.cancel_requested() {
            op.complete_cancelled();
            self.release_slot();
            if let Some(core) = self.router() {
                core.operation_complete();
            }
            return;
        }

        let retry = match self.exchange(&mut *op).await {
            Ok(()) => {
                op.succeed();
                false
            }
            Err(err) => {
                warn!(node = %self.addr(), error = %err, "operation attempt failed");
                let retryable = is_retryable(&err);
                let tries_remain = op.record_failure(err);
                retryable && tries_remain
            }
        };

        self.release_slot();

        if retry {
            match self.router() {
                Some(core) => core.resubmit(op),
                None => op.fail(),
            }
        } else if !op.is_terminal() {
            op.fail();
        }

        if let Some(core) = self.router() {
            core.operation_complete();
        }
    }

    /// One attempt: acquire a connection, write the request frame, read
    /// response frames until the operation reports the response complete.
    /// Any error poisons the connection, which is discarded rather than
    /// returned to the pool.
    async fn exchange(&self, op: &mut dyn WireOperation) -> Result<()> {
        let Some(mut conn) = self.inner.pool.acquire().await? else {
            return Err(CoveError::NodeUnavailable(format!(
                "no connection capacity on {}",
                self.addr()
            )));
        };

        match Self::drive(&mut conn, op).await {
            Ok(()) => {
                self.inner.pool.release(conn, true);
                Ok(())
            }
            Err(err) => {
                debug!(node = %self.addr(), "discarding connection after failed exchange");
                self.inner.pool.release(conn, false);
                Err(err)
            }
        }
    }

    async fn drive(conn: &mut Connection, op: &mut dyn WireOperation) -> Result<()> {
        conn.send(&op.request()).await?;
        loop {
            let frame = conn.recv().await?;
            if op.on_frame(frame)? {
                return Ok(());
            }
        }
    }
}
