use thiserror::Error;

/// Error type shared by every layer of the client.
///
/// All payloads are owned strings or small copies so the enum is `Clone`:
/// a completed operation future stores its failure once and replays it to
/// any number of callers.
#[derive(Error, Debug, Clone)]
pub enum CoveError {
    /// No node can accept the operation and the operation queue is full.
    #[error("no node available and the operation queue is full")]
    CapacityExceeded,

    /// The selected node is not running or has no pool capacity left.
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),

    /// The connection failed mid-exchange; the connection is discarded.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer sent a frame the protocol does not allow here.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A coverage plan contained an entry that cannot be routed to; the
    /// whole plan is rejected.
    #[error("unroutable coverage entry: {0}")]
    UnroutableCoverageEntry(String),

    /// The operation was cancelled before it produced a result.
    #[error("operation cancelled")]
    Cancelled,

    /// The store answered with an error frame.
    #[error("server error {code}: {message}")]
    Server { code: u32, message: String },

    /// An I/O deadline elapsed.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// A payload failed protobuf decoding.
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The cluster is shutting down and accepts no new operations.
    #[error("cluster shutting down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, CoveError>;
