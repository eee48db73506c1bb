//! covekv Client Core
//!
//! The connectivity core of the covekv client: pooled connections to many
//! store nodes, a cluster-level load balancer with a bounded operation
//! queue, a generic asynchronous operation abstraction, and coverage-plan
//! decoding for partition-aware query fan-out.
//!
//! # Architecture
//!
//! - [`Node`] wraps one remote endpoint with a bounded connection pool and a
//!   monotonic lifecycle (`Created` → `Running` → `ShuttingDown` →
//!   `Shutdown`).
//! - [`Cluster`] owns a set of nodes, selects one per operation via
//!   round-robin among nodes with spare capacity, and queues operations in
//!   FIFO order when none is eligible.
//! - [`Operation`] pairs a wire request with decode/convert logic behind a
//!   single-fire [`OperationFuture`]; every failure surfaces through the
//!   future, never through `execute` itself.
//! - [`CoveragePlanBuilder`] produces the concrete operation that asks the
//!   store which `(host, port)` owns each partition.
//!
//! # Example
//!
//! ```no_run
//! use covekv_core::{Cluster, CoveragePlanBuilder, Namespace, NodeBuilder};
//!
//! # #[tokio::main]
//! # async fn main() -> covekv_core::Result<()> {
//! let node = NodeBuilder::new()
//!     .with_remote_host("10.0.0.1")
//!     .with_remote_port(8087)
//!     .with_min_connections(2)
//!     .build();
//!
//! let cluster = Cluster::builder()
//!     .with_node(node)
//!     .with_operation_queue_max_depth(128)
//!     .build();
//! cluster.start();
//!
//! let op = CoveragePlanBuilder::new(Namespace::with_default_type("users")).build();
//! let future = cluster.execute(op);
//! let plan = future.get().await?;
//! for entry in &plan {
//!     println!("{}:{} covers {}", entry.host(), entry.port(), entry.description());
//! }
//!
//! cluster.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cluster;
mod connection;
pub mod events;
pub mod node;
pub mod operation;
pub mod operations;
mod pool;
pub mod query;

pub use cluster::{Cluster, ClusterBuilder};
pub use events::NodeStateListener;
pub use node::{Node, NodeBuilder, NodeState};
pub use operation::{Decoded, Operation, OperationCodec, OperationFuture};
pub use operations::coverage::{CoverageCodec, CoverageEntry, CoveragePlan, CoveragePlanBuilder};
pub use operations::ping::{ping_operation, PingCodec};
pub use query::{HostAndPort, Namespace, DEFAULT_BUCKET_TYPE};

pub use covekv_common::protocol::{CoveError, Result};
