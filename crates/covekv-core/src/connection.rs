use std::net::ToSocketAddrs;
use std::time::Duration;

use tokio::net::TcpStream;

use covekv_common::protocol::{CoveError, Result, WireMessage};
use covekv_common::transport::{read_frame, write_frame};

/// Default timeout for establishing a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One transport channel to a node's endpoint.
///
/// The protocol is not pipelined: a connection carries at most one in-flight
/// request, which is enforced by ownership: the task driving an exchange
/// holds the connection exclusively until it releases it back to the pool.
pub(crate) struct Connection {
    stream: TcpStream,
    addr: String,
}

impl Connection {
    /// Opens a connection to `addr`.
    ///
    /// The address is resolved (possibly to multiple socket addresses) and
    /// each candidate is tried until one connects.
    pub(crate) async fn open(addr: &str) -> Result<Self> {
        let socket_addrs = addr
            .to_socket_addrs()
            .map_err(|e| CoveError::Transport(format!("invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&socket_addr)).await {
                Ok(Ok(stream)) => {
                    return Ok(Self {
                        stream,
                        addr: addr.to_string(),
                    });
                }
                Ok(Err(e)) => {
                    last_err = Some(CoveError::Transport(format!(
                        "failed to connect to {}: {}",
                        socket_addr, e
                    )));
                }
                Err(_) => {
                    last_err = Some(CoveError::Timeout(CONNECT_TIMEOUT.as_millis() as u64));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| CoveError::Transport(format!("no addresses resolved for '{}'", addr))))
    }

    pub(crate) async fn send(&mut self, message: &WireMessage) -> Result<()> {
        write_frame(&mut self.stream, message).await
    }

    pub(crate) async fn recv(&mut self) -> Result<WireMessage> {
        read_frame(&mut self.stream).await
    }

    #[allow(dead_code)]
    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_refused_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Connection::open(&format!("127.0.0.1:{}", port)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_invalid_address_fails() {
        let result = Connection::open("not an address").await;
        assert!(matches!(result, Err(CoveError::Transport(_))));
    }
}
