//! Unified error type for the chatango client.

use chatango_protocol::ProtocolError;
use chatango_room::RoomError;
use chatango_session::SessionError;
use chatango_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `chatango` crate you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatangoError {
    /// A transport-level error (connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed frame or field.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Credentials, shard resolution or an account HTTP call.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (already joined, not joined, actor gone).
    #[error(transparent)]
    Room(#[from] RoomError),
}
