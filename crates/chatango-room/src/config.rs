//! Room configuration and connection state machine.

use std::time::Duration;

use chatango_keepalive::KeepAliveConfig;
use chatango_protocol::{OverflowPolicy, MAX_FRAME_LEN, MAX_POST_LENGTH};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings shared by every room a manager joins.
///
/// All fields have defaults, so a config file only needs to name the ones
/// it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Longest body (after escaping) sent in a single post.
    pub max_message_length: usize,

    /// What to do with bodies longer than `max_message_length`.
    pub overflow: OverflowPolicy,

    /// Posts requested per `get_more` page.
    pub history_page_size: u32,

    /// Server port.
    pub port: u16,

    /// Domain appended to `s{shard}.`.
    pub host_suffix: String,

    /// Connect here instead of the resolved shard host (`host:port`).
    pub server_address: Option<String>,

    /// Give up on a connect attempt after this many seconds.
    pub connect_timeout_secs: u64,

    /// Confirmed posts remembered for delete notifications. Oldest are
    /// forgotten first.
    pub tracked_messages: usize,

    /// Capacity of each room actor's command channel.
    pub command_channel_size: usize,

    /// Frames queued for the writer before the link counts as stalled
    /// and is dropped.
    pub write_queue_size: usize,

    /// Largest inbound frame accepted; longer ones are skipped.
    pub max_frame_len: usize,

    pub keepalive: KeepAliveConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_message_length: MAX_POST_LENGTH,
            overflow: OverflowPolicy::default(),
            history_page_size: 20,
            port: 443,
            host_suffix: "chatango.com".into(),
            server_address: None,
            connect_timeout_secs: 10,
            tracked_messages: 500,
            command_channel_size: 64,
            write_queue_size: 1024,
            max_frame_len: MAX_FRAME_LEN,
            keepalive: KeepAliveConfig::default(),
        }
    }
}

impl RoomConfig {
    /// The `host:port` to dial for a room on `shard`.
    pub fn address(&self, shard: u32) -> String {
        match &self.server_address {
            Some(addr) => addr.clone(),
            None => format!(
                "{}:{}",
                chatango_session::shard_host(shard, &self.host_suffix),
                self.port
            ),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room connection.
///
/// ```text
/// Connecting → Authenticating → Initializing → Live → Disconnected
///                    ↑                          │          │
///                    └──────── Reconnecting ←───┴──────────┘
/// ```
///
/// - **Connecting**: opening the socket.
/// - **Authenticating**: `bauth` sent, waiting for `ok` or `denied`.
/// - **Initializing**: logged in; the server is replaying backlog until
///   it sends `inited`.
/// - **Live**: steady state, every room verb is dispatched.
/// - **Disconnected**: socket closed and keep-alive cancelled. The actor
///   stays up so the room can be reconnected.
/// - **Reconnecting**: an explicit reconnect is opening a new socket.
///
/// Any state except Disconnected can fall to Disconnected on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Connecting,
    Authenticating,
    Initializing,
    Live,
    Disconnected,
    Reconnecting,
}

impl RoomState {
    /// Returns `true` while a socket is open and logged in.
    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::Initializing | Self::Live)
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        use RoomState::*;
        match (self, target) {
            (Connecting, Authenticating) => true,
            (Authenticating, Initializing) => true,
            (Initializing, Live) => true,
            (Live | Disconnected, Reconnecting) => true,
            (Reconnecting, Authenticating) => true,
            (Disconnected, Disconnected) => false,
            (_, Disconnected) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Live => write!(f, "Live"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}
