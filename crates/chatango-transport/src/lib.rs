//! Transport abstraction layer for the chatango client.
//!
//! Provides the [`Connector`] trait that opens byte-stream connections to a
//! chat server, and the [`Connection`] type that splits such a stream into
//! an independently owned reader and writer half.
//!
//! # Feature Flags
//!
//! - `tcp` (default): plain TCP via [`TcpConnector`]
//! - `memory` (default): in-process duplex pipes via [`MemoryConnector`],
//!   used to drive sessions against a scripted server in tests

mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryConnector, MemoryListener};
#[cfg(feature = "tcp")]
pub use tcp::TcpConnector;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

/// Size of the buffer handed to each socket read.
const READ_CHUNK: usize = 8 * 1024;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens outgoing connections.
///
/// The returned future must be `Send` because sessions connect from inside
/// their own spawned actor task.
pub trait Connector: Send + Sync + 'static {
    /// The byte stream produced by this connector.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Connects to `addr` (`host:port`).
    fn connect(
        &self,
        addr: &str,
    ) -> impl Future<Output = Result<Connection<Self::Stream>, TransportError>> + Send;
}

/// An open connection to a remote peer.
pub struct Connection<S> {
    id: ConnectionId,
    peer: String,
    stream: S,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Wraps an already-connected stream.
    pub fn new(peer: impl Into<String>, stream: S) -> Self {
        Self {
            id: ConnectionId::next(),
            peer: peer.into(),
            stream,
        }
    }

    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the address this connection was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Splits the connection so reads and writes can live in separate tasks.
    pub fn split(self) -> (ConnectionReader<S>, ConnectionWriter<S>) {
        let (read, write) = tokio::io::split(self.stream);
        (
            ConnectionReader {
                id: self.id,
                inner: read,
            },
            ConnectionWriter {
                id: self.id,
                inner: write,
            },
        )
    }
}

/// The read half of a [`Connection`].
pub struct ConnectionReader<S> {
    id: ConnectionId,
    inner: ReadHalf<S>,
}

impl<S> ConnectionReader<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Receives the next chunk of bytes.
    ///
    /// Chunk boundaries are arbitrary; framing is the protocol layer's job.
    /// Returns `Ok(None)` when the peer closed the stream.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = vec![0u8; READ_CHUNK];
        let n = self
            .inner
            .read(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            tracing::debug!(id = %self.id, "peer closed the stream");
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    /// Returns the connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

/// The write half of a [`Connection`].
pub struct ConnectionWriter<S> {
    id: ConnectionId,
    inner: WriteHalf<S>,
}

impl<S> ConnectionWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Writes all of `data` and flushes it.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.inner
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        self.inner.flush().await.map_err(TransportError::SendFailed)
    }

    /// Shuts down the write direction, signalling EOF to the peer.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    /// Returns the connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}
