//! In-process connector backed by `tokio::io::duplex`.
//!
//! Every `connect` call creates a fresh pipe; the client end goes back to
//! the caller and the server end is delivered to the paired
//! [`MemoryListener`], which plays the chat server.

use tokio::io::DuplexStream;
use tokio::sync::{Mutex, mpsc};

use crate::{Connection, Connector, TransportError};

/// Capacity of each direction of the in-memory pipe.
const PIPE_CAPACITY: usize = 64 * 1024;

/// A [`Connector`] that hands out in-memory pipes.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<(String, DuplexStream)>,
}

/// The server side of a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryListener {
    incoming: Mutex<mpsc::UnboundedReceiver<(String, DuplexStream)>>,
}

impl MemoryConnector {
    /// Creates a connector and the listener that receives its connections.
    pub fn pair() -> (MemoryConnector, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MemoryConnector { accepted: tx },
            MemoryListener {
                incoming: Mutex::new(rx),
            },
        )
    }
}

impl Connector for MemoryConnector {
    type Stream = DuplexStream;

    async fn connect(
        &self,
        addr: &str,
    ) -> Result<Connection<DuplexStream>, TransportError> {
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        self.accepted
            .send((addr.to_string(), server))
            .map_err(|_| {
                TransportError::ConnectFailed {
                    addr: addr.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "memory listener dropped",
                    ),
                }
            })?;
        Ok(Connection::new(addr, client))
    }
}

impl MemoryListener {
    /// Waits for the next connection. Returns the address the client
    /// asked for together with the server end of the pipe.
    ///
    /// Returns `None` once every connector clone has been dropped.
    pub async fn accept(&self) -> Option<(String, DuplexStream)> {
        self.incoming.lock().await.recv().await
    }
}
