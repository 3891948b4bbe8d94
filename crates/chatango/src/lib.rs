//! # chatango
//!
//! Async client for the chatango chat protocol.
//!
//! Each joined room runs as its own actor task that owns the socket,
//! decodes the NUL-delimited frame stream, keeps room state (participants,
//! moderators, bans, history) and reports everything that happens as typed
//! [`RoomEvent`]s on one channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatango::prelude::*;
//!
//! # async fn run() -> Result<(), ChatangoError> {
//! chatango::init_tracing("info");
//!
//! let mut client = Client::builder()
//!     .credentials(Credentials::anonymous())
//!     .build()?;
//! let room = client.manager_mut().join_room("monachat")?;
//!
//! while let Some(update) = client.next_update().await {
//!     if let RoomEvent::Connected = update.event {
//!         room.post("hello").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - [`transport`]: TCP and in-memory connectors
//! - [`protocol`]: framing, post parsing and wire types
//! - [`session`]: credentials, shard resolution, account HTTP calls
//! - [`keepalive`]: the ping timer
//! - [`room`]: room actors, their events and the manager

mod client;
mod error;

pub use chatango_keepalive as keepalive;
pub use chatango_protocol as protocol;
pub use chatango_room as room;
pub use chatango_session as session;
pub use chatango_transport as transport;

pub use client::{Client, ClientBuilder, ClientConfig};
pub use error::ChatangoError;

pub use chatango_room::{RoomEvent, RoomHandle, RoomManager, RoomUpdate};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber that writes to stderr.
///
/// `RUST_LOG` takes precedence; `default_filter` applies when it is unset
/// or invalid. Returns `false` if a subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .is_ok()
}

/// Everything most applications need.
pub mod prelude {
    pub use crate::{Client, ClientBuilder, ClientConfig, ChatangoError};
    pub use chatango_keepalive::KeepAliveConfig;
    pub use chatango_protocol::{
        Author, AuthorKind, BanRecord, Channel, Formatting, OverflowPolicy, Post, PostId,
        PostOptions,
    };
    pub use chatango_room::{
        CommandStatus, DisconnectReason, JoinKind, Moderator, Participant, RoomConfig, RoomError, RoomEvent,
        RoomHandle, RoomInfo, RoomManager, RoomState, RoomUpdate,
    };
    pub use chatango_session::{AccountConfig, Credentials, LoginMode};
    pub use chatango_transport::{Connector, MemoryConnector, TcpConnector};
}
