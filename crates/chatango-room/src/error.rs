//! Error types for the room layer.

use chatango_session::SessionError;

/// Errors returned by [`RoomManager`](crate::RoomManager) and
/// [`RoomHandle`](crate::RoomHandle).
///
/// Connection failures are not here: they arrive on the event stream as
/// [`RoomEvent::ConnectionError`](crate::RoomEvent::ConnectionError).
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The manager already has a session for this room.
    #[error("already joined room {0}")]
    AlreadyJoined(String),

    /// The manager has no session for this room.
    #[error("not in room {0}")]
    NotJoined(String),

    /// The room actor has exited.
    #[error("room {0} is unavailable")]
    Unavailable(String),

    /// Shard resolution or an account call failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}
