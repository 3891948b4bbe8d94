//! Events a room session reports to the application.
//!
//! Every session pushes [`RoomUpdate`]s onto one unbounded channel owned by
//! its manager. Events from one room arrive in the order the session
//! produced them.

use chatango_protocol::{BanRecord, Post};
use serde::{Deserialize, Serialize};

/// A room member as listed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub session_id: String,
    pub user_id: String,
    /// Display name; temporary names carry a `#` prefix.
    pub name: String,
    /// When the member joined, in server seconds.
    pub joined_at: f64,
}

/// A room moderator and the permission bits the server granted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moderator {
    pub name: String,
    pub permissions: u64,
}

/// How a member appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// Joined the room.
    Join,
    /// Was already present anonymously and just took a name.
    Login,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The application asked for it.
    Deliberate,
    /// Nothing was received for a whole keep-alive interval.
    KeepAliveTimeout,
    /// The server refused the credentials.
    LoginFailed,
    /// The server refused the room.
    Denied,
    /// The server closed the socket.
    ServerClosed,
    /// The transport failed (connect, read or write).
    Transport(String),
}

impl DisconnectReason {
    /// Whether the application caused this disconnect.
    pub fn is_deliberate(&self) -> bool {
        matches!(self, Self::Deliberate)
    }
}

/// Something that happened in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// Login finished and the room is live.
    Connected,
    /// The server rejected our name and password.
    LoginFailed,
    /// The server refused to let us into the room.
    Denied,
    /// A batch of history: the initial backlog, or one `get_more` page.
    HistoryDone { posts: Vec<Post>, initial: bool },
    ParticipantsUpdated { participants: Vec<Participant> },
    MemberJoin { participant: Participant, kind: JoinKind },
    MemberLeave { participant: Participant },
    UserCountChanged { count: u32 },
    /// A post confirmed by the server.
    Message { post: Post },
    /// The server confirmed a provisional id we never saw.
    MessageDropped {
        provisional_id: String,
        message_id: String,
    },
    BannedWordsChanged {
        partial: Vec<String>,
        exact: Vec<String>,
    },
    RateLimitChanged { seconds: u32 },
    FloodWarning,
    FloodBan { seconds: u32 },
    FloodBanRepeat { seconds: u32 },
    BanListUpdated { bans: Vec<BanRecord> },
    Ban { record: BanRecord },
    Unban { record: BanRecord },
    ModAdded { name: String },
    ModRemoved { name: String },
    /// Sent for every `mods` frame, after any `ModAdded`/`ModRemoved`.
    ModChanged { moderators: Vec<Moderator> },
    /// A post was removed. `post` is set if it was still remembered.
    MessageDelete {
        message_id: String,
        post: Option<Post>,
    },
    /// The connection ended. Always the last event of a connection.
    ConnectionError { reason: DisconnectReason },
}

/// A [`RoomEvent`] tagged with the room it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUpdate {
    pub room: String,
    pub event: RoomEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_value(RoomEvent::FloodBan { seconds: 60 }).unwrap();
        assert_eq!(json["type"], "flood_ban");
        assert_eq!(json["seconds"], 60);
    }

    #[test]
    fn test_disconnect_reason_json() {
        let json = serde_json::to_value(RoomEvent::ConnectionError {
            reason: DisconnectReason::Transport("reset".into()),
        })
        .unwrap();
        assert_eq!(json["type"], "connection_error");
        assert_eq!(json["reason"]["kind"], "transport");
        assert_eq!(json["reason"]["detail"], "reset");
    }

    #[test]
    fn test_disconnect_reason_is_deliberate() {
        assert!(DisconnectReason::Deliberate.is_deliberate());
        assert!(!DisconnectReason::KeepAliveTimeout.is_deliberate());
    }
}
