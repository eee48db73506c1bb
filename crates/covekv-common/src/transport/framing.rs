use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{CoveError, Result};
use crate::protocol::message::WireMessage;

/// Maximum accepted frame size (code byte plus payload).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Writes one framed message.
///
/// Wire format: `[4-byte length as u32 big-endian] [code] [payload]`, where
/// the length covers the code byte plus the payload.
///
/// # Errors
///
/// Returns an error if writing to the stream fails.
pub async fn write_frame<S>(stream: &mut S, message: &WireMessage) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let len = message.encoded_len() as u32;

    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| map_io_error(e, "writing length prefix"))?;
    stream
        .write_all(&[message.code])
        .await
        .map_err(|e| map_io_error(e, "writing message code"))?;
    stream
        .write_all(&message.body)
        .await
        .map_err(|e| map_io_error(e, "writing payload"))?;
    stream
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Reads one framed message.
///
/// # Errors
///
/// Returns an error if:
/// - Reading from the stream fails
/// - The frame is empty or exceeds [`MAX_FRAME_SIZE`]
pub async fn read_frame<S>(stream: &mut S) -> Result<WireMessage>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| map_io_error(e, "reading length prefix"))?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(CoveError::Protocol("zero-length frame".to_string()));
    }
    if len > MAX_FRAME_SIZE {
        return Err(CoveError::Protocol(format!(
            "frame too large: {} bytes (max {} bytes)",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut code = [0u8; 1];
    stream
        .read_exact(&mut code)
        .await
        .map_err(|e| map_io_error(e, "reading message code"))?;

    let mut body = vec![0u8; len - 1];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| map_io_error(e, "reading payload"))?;

    Ok(WireMessage {
        code: code[0],
        body: Bytes::from(body),
    })
}

/// Map IO errors to typed transport errors with call-site context.
fn map_io_error(err: std::io::Error, context: &str) -> CoveError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected => {
            CoveError::Transport(format!("{}: connection lost", context))
        }
        _ => CoveError::Transport(format!("{}: {}", context, err)),
    }
}
