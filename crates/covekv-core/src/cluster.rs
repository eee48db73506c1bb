//! The cluster: a set of nodes behind one logical client.
//!
//! Callers submit operations to the cluster only. Selection is round-robin
//! among nodes that are `Running` with spare pool capacity; when none is
//! eligible the operation joins a bounded FIFO queue, and when the queue is
//! full it fails immediately with [`CoveError::CapacityExceeded`]. All
//! failures surface through the operation's own future; `execute` never
//! blocks and never errors through its return path.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use covekv_common::protocol::CoveError;

use crate::events::{EventHub, NodeStateListener};
use crate::node::{Node, Submission};
use crate::operation::{Operation, OperationCodec, OperationFuture, WireOperation};

/// Whether a failed attempt may be routed to another node.
///
/// Transport failures and capacity misses are transient; protocol and
/// server errors are terminal for the operation.
pub(crate) fn is_retryable(error: &CoveError) -> bool {
    matches!(
        error,
        CoveError::Transport(_) | CoveError::NodeUnavailable(_) | CoveError::Timeout(_)
    )
}

/// Builder for a [`Cluster`].
pub struct ClusterBuilder {
    nodes: Vec<Node>,
    operation_queue_max_depth: usize,
    execution_attempts: u8,
}

impl ClusterBuilder {
    /// Queueing is disabled unless a depth is configured; with depth 0 any
    /// submission that finds no eligible node fails immediately.
    pub const DEFAULT_OPERATION_QUEUE_MAX_DEPTH: usize = 0;
    pub const DEFAULT_EXECUTION_ATTEMPTS: u8 = 3;

    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            operation_queue_max_depth: Self::DEFAULT_OPERATION_QUEUE_MAX_DEPTH,
            execution_attempts: Self::DEFAULT_EXECUTION_ATTEMPTS,
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn with_operation_queue_max_depth(mut self, depth: usize) -> Self {
        self.operation_queue_max_depth = depth;
        self
    }

    /// How many nodes a transiently failing operation is tried on before
    /// its future fails.
    pub fn with_execution_attempts(mut self, attempts: u8) -> Self {
        self.execution_attempts = attempts.max(1);
        self
    }

    /// Builds the cluster. Must be called within a Tokio runtime (the
    /// event dispatcher task is spawned here).
    pub fn build(self) -> Cluster {
        let core = Arc::new(ClusterCore {
            inner: Mutex::new(ClusterInner {
                nodes: Vec::new(),
                queue: VecDeque::new(),
                cursor: 0,
                accepting: true,
                started: false,
            }),
            operation_queue_max_depth: self.operation_queue_max_depth,
            execution_attempts: self.execution_attempts,
            hub: EventHub::new(),
        });

        let cluster = Cluster { core };
        for node in self.nodes {
            cluster.attach_node(node);
        }
        cluster
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ClusterInner {
    nodes: Vec<Node>,
    queue: VecDeque<Box<dyn WireOperation>>,
    cursor: usize,
    accepting: bool,
    started: bool,
}

/// Shared cluster state; nodes hold a weak reference back for completion
/// and retry routing.
pub(crate) struct ClusterCore {
    /// Single lock guarding queue, node list, and cursor together, so
    /// dispatch decisions and capacity accounting are never observed in an
    /// inconsistent intermediate state.
    inner: Mutex<ClusterInner>,
    operation_queue_max_depth: usize,
    execution_attempts: u8,
    hub: EventHub,
}

impl ClusterCore {
    /// Routes an operation: immediate dispatch when the queue is empty and
    /// a node accepts, otherwise enqueue, otherwise fail with
    /// `CapacityExceeded`.
    pub(crate) fn submit(&self, mut op: Box<dyn WireOperation>) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.accepting {
            drop(inner);
            op.fail_with(CoveError::Shutdown);
            return;
        }
        if op.is_terminal() {
            return;
        }

        // Direct dispatch would overtake queued operations; FIFO order
        // requires going through the queue whenever it is non-empty.
        if inner.queue.is_empty() {
            match Self::try_dispatch(&mut inner, op) {
                None => return,
                Some(returned) => op = returned,
            }
        }

        if inner.queue.len() < self.operation_queue_max_depth {
            inner.queue.push_back(op);
            debug!(depth = inner.queue.len(), "operation queued");
        } else {
            drop(inner);
            debug!("operation queue full, rejecting submission");
            op.fail_with(CoveError::CapacityExceeded);
        }
    }

    /// Re-routes an operation whose previous attempt failed transiently.
    pub(crate) fn resubmit(&self, op: Box<dyn WireOperation>) {
        debug!("re-routing operation after failed attempt");
        self.submit(op);
    }

    /// Called by nodes when an operation finishes, freeing capacity.
    pub(crate) fn operation_complete(&self) {
        self.drain();
    }

    /// Dispatches queued operations in FIFO order while some node has
    /// capacity. Terminal (cancelled) operations are discarded. A dispatch
    /// failure for one operation never halts draining of the rest: a
    /// rejected operation goes back to the head and the loop ends until the
    /// next capacity change.
    pub(crate) fn drain(&self) {
        loop {
            let mut inner = self.inner.lock().unwrap();
            let Some(op) = inner.queue.pop_front() else {
                return;
            };
            if op.is_terminal() {
                debug!("discarding terminal queued operation");
                continue;
            }
            match Self::try_dispatch(&mut inner, op) {
                None => continue,
                Some(op) => {
                    inner.queue.push_front(op);
                    return;
                }
            }
        }
    }

    /// Round-robin scan over the node list starting at the cursor; the
    /// first node that accepts wins. Returns the operation when no node
    /// can take it. The policy is confined to this function.
    fn try_dispatch(
        inner: &mut ClusterInner,
        mut op: Box<dyn WireOperation>,
    ) -> Option<Box<dyn WireOperation>> {
        let count = inner.nodes.len();
        if count == 0 {
            return Some(op);
        }
        for offset in 0..count {
            let idx = (inner.cursor + offset) % count;
            match inner.nodes[idx].submit(op) {
                Submission::Accepted => {
                    inner.cursor = (idx + 1) % count;
                    return None;
                }
                Submission::Rejected(returned) => op = returned,
            }
        }
        Some(op)
    }
}

/// The set of nodes plus the load balancer and backpressure queue,
/// presented to callers as one logical client.
///
/// `Cluster` is a cheap handle; clones share the same underlying state.
#[derive(Clone)]
pub struct Cluster {
    core: Arc<ClusterCore>,
}

impl Cluster {
    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::new()
    }

    /// Starts every node; warm-ups proceed concurrently and this returns
    /// without waiting for them.
    pub fn start(&self) {
        let nodes = {
            let mut inner = self.core.inner.lock().unwrap();
            inner.started = true;
            inner.nodes.clone()
        };
        info!(nodes = nodes.len(), "starting cluster");
        for node in &nodes {
            node.start();
        }
        self.core.drain();
    }

    /// Submits an operation for execution.
    ///
    /// Never blocks and never errors through the return path: capacity
    /// exhaustion, transport failures, and shutdown all surface through the
    /// returned future. Must be called within a Tokio runtime.
    pub fn execute<C: OperationCodec>(&self, mut op: Operation<C>) -> OperationFuture<C::Output> {
        op.set_attempts(self.core.execution_attempts);
        let future = op.future();
        self.core.submit(Box::new(op));
        future
    }

    /// Adds a node at runtime. If the cluster is already started the node
    /// is started too, and the queue drains toward the new capacity.
    pub fn add_node(&self, node: Node) {
        {
            let inner = self.core.inner.lock().unwrap();
            if inner.nodes.iter().any(|n| n.same_node(&node)) {
                return;
            }
        }
        self.attach_node(node.clone());
        let start_now = self.core.inner.lock().unwrap().started;
        if start_now {
            node.start();
        }
        info!(node = %node.addr(), "node added to cluster");
        self.core.drain();
    }

    /// Removes a node and shuts it down. In-flight operations on the node
    /// finish; it just receives no new work.
    pub fn remove_node(&self, node: &Node) -> bool {
        let removed = {
            let mut inner = self.core.inner.lock().unwrap();
            match inner.nodes.iter().position(|n| n.same_node(node)) {
                Some(idx) => {
                    inner.nodes.remove(idx);
                    true
                }
                None => false,
            }
        };
        if removed {
            info!(node = %node.addr(), "node removed from cluster");
            node.shutdown();
        }
        removed
    }

    pub fn node_count(&self) -> usize {
        self.core.inner.lock().unwrap().nodes.len()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.core.inner.lock().unwrap().nodes.clone()
    }

    /// Registers a listener for node lifecycle transitions. The listener
    /// first receives each existing node's current state, then live events,
    /// so no transition history is missed regardless of registration time.
    pub fn register_node_state_listener(&self, listener: Arc<dyn NodeStateListener>) {
        self.core.hub.register(listener);
    }

    /// Shuts the cluster down: new submissions are refused, queued
    /// operations fail with [`CoveError::Shutdown`], every node drains its
    /// in-flight work, and this resolves once all nodes reach
    /// [`NodeState::Shutdown`](crate::node::NodeState), giving callers a
    /// single join point.
    pub async fn shutdown(&self) {
        info!("cluster shutdown requested");
        let (nodes, queued) = {
            let mut inner = self.core.inner.lock().unwrap();
            inner.accepting = false;
            let queued: Vec<Box<dyn WireOperation>> = inner.queue.drain(..).collect();
            (inner.nodes.clone(), queued)
        };
        for mut op in queued {
            op.fail_with(CoveError::Shutdown);
        }
        for node in &nodes {
            node.shutdown();
        }
        futures::future::join_all(nodes.iter().map(|node| node.await_shutdown())).await;
        info!("cluster shutdown complete");
    }

    fn attach_node(&self, node: Node) {
        let sender = self.core.hub.sender();
        node.attach(sender.clone(), Arc::downgrade(&self.core));
        // Seed the hub with the node's current state so listeners
        // registered at any time see its full history.
        sender.transition(node.clone(), node.state());
        self.core.inner.lock().unwrap().nodes.push(node);
    }
}
