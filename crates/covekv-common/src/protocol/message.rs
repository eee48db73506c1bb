use bytes::Bytes;
use prost::Message as _;

use crate::protocol::error::{CoveError, Result};
use crate::protocol::messages::ErrorResp;

/// Message codes carried in the byte following the length prefix.
pub mod codes {
    /// Error response; the payload is an [`ErrorResp`](super::ErrorResp).
    pub const ERROR_RESP: u8 = 0;
    /// Liveness probe request (empty payload).
    pub const PING_REQ: u8 = 1;
    /// Liveness probe response (empty payload).
    pub const PING_RESP: u8 = 2;
    /// Coverage plan request.
    pub const COVERAGE_REQ: u8 = 70;
    /// Coverage plan response.
    pub const COVERAGE_RESP: u8 = 71;
}

/// One protocol message: a message code and its protobuf-encoded payload.
///
/// A `WireMessage` is what the framing layer reads and writes; it carries no
/// knowledge of which payload type the body holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub code: u8,
    pub body: Bytes,
}

impl WireMessage {
    pub fn new(code: u8, body: impl Into<Bytes>) -> Self {
        Self {
            code,
            body: body.into(),
        }
    }

    /// Encoded size on the wire, excluding the length prefix.
    pub fn encoded_len(&self) -> usize {
        1 + self.body.len()
    }
}

/// Validates a response frame's message code.
///
/// A frame carrying [`codes::ERROR_RESP`] is decoded and surfaced as
/// [`CoveError::Server`]; any other unexpected code is a
/// [`CoveError::Protocol`]. Both become typed failures on the operation's
/// future rather than faults on the I/O task.
pub fn expect_code(message: &WireMessage, expected: u8) -> Result<()> {
    if message.code == codes::ERROR_RESP {
        let err = ErrorResp::decode(message.body.clone())?;
        return Err(CoveError::Server {
            code: err.errcode,
            message: err.errmsg,
        });
    }
    if message.code != expected {
        return Err(CoveError::Protocol(format!(
            "unexpected message code {} (expected {})",
            message.code, expected
        )));
    }
    Ok(())
}
