//! Liveness probe.

use bytes::Bytes;

use covekv_common::protocol::{codes, expect_code, Result, WireMessage};

use crate::operation::{Decoded, Operation, OperationCodec};

/// Codec for the ping operation: empty request, empty response.
pub struct PingCodec;

impl OperationCodec for PingCodec {
    type Frame = ();
    type Output = ();

    fn request(&self) -> WireMessage {
        WireMessage::new(codes::PING_REQ, Bytes::new())
    }

    fn decode(&self, raw: WireMessage) -> Result<Decoded<()>> {
        expect_code(&raw, codes::PING_RESP)?;
        Ok(Decoded {
            frame: (),
            done: true,
        })
    }

    fn convert(&self, _frames: Vec<()>) -> Result<()> {
        Ok(())
    }
}

/// A ready-to-submit ping operation.
pub fn ping_operation() -> Operation<PingCodec> {
    Operation::new(PingCodec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let msg = PingCodec.request();
        assert_eq!(msg.code, codes::PING_REQ);
        assert!(msg.body.is_empty());
    }

    #[test]
    fn test_decode_rejects_wrong_code() {
        let result = PingCodec.decode(WireMessage::new(codes::COVERAGE_RESP, Bytes::new()));
        assert!(result.is_err());
    }
}
