//! Room sessions for the chatango client.
//!
//! Each joined room runs as an isolated Tokio task (actor model) that owns
//! its connection, its session state and its keep-alive timer.
//!
//! # Key types
//!
//! - [`RoomManager`]: joins and leaves rooms, owns the event stream
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomSession`]: the per-room protocol state machine, usable without
//!   a runtime
//! - [`RoomEvent`]: everything a room reports, tagged by room in
//!   [`RoomUpdate`]
//! - [`RoomState`]: connection lifecycle
//! - [`RoomConfig`]: limits, addresses and timers

mod config;
mod error;
mod event;
mod manager;
mod room;
mod session;

pub use config::{RoomConfig, RoomState};
pub use error::RoomError;
pub use event::{DisconnectReason, JoinKind, Moderator, Participant, RoomEvent, RoomUpdate};
pub use manager::RoomManager;
pub use room::RoomHandle;
pub use session::{CommandStatus, Operation, Outbox, RoomInfo, RoomSession};
