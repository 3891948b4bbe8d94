//! Plain TCP connector.
//!
//! Chat shards listen on port 443 but speak the raw text protocol, not TLS,
//! so a bare `TcpStream` is all a session needs.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::{Connection, Connector, TransportError};

/// A [`Connector`] that opens TCP streams.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector that gives up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(
        &self,
        addr: &str,
    ) -> Result<Connection<TcpStream>, TransportError> {
        let stream =
            tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| TransportError::ConnectTimedOut(addr.to_string()))?
                .map_err(|source| TransportError::ConnectFailed {
                    addr: addr.to_string(),
                    source,
                })?;

        // Frames are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(addr, error = %e, "could not disable Nagle");
        }

        let conn = Connection::new(addr, stream);
        tracing::debug!(id = %conn.id(), addr, "TCP connection opened");
        Ok(conn)
    }
}
