//! Core protocol types for the chatango wire format.
//!
//! Everything here either travels on the wire ([`Command`], [`Frame`]) or
//! is decoded from it ([`Post`], [`BanRecord`], [`ChannelFlags`],
//! [`Formatting`]). Decoded types derive serde so the embedding
//! application can log or persist them as-is.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Command / Frame: the raw wire units
// ---------------------------------------------------------------------------

/// A verb followed by its positional arguments.
///
/// Used in both directions: the decoder produces one for every inbound
/// frame and the session builds them for outbound traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The command name (`bauth`, `b`, `inited`, ...).
    pub verb: String,
    /// Positional arguments in wire order.
    pub args: Vec<String>,
}

impl Command {
    /// Creates a command with no arguments.
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument (builder style).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Tokenizes a frame payload on `:`. The first field is the verb.
    pub fn parse(text: &str) -> Self {
        let mut fields = text.split(':');
        let verb = fields.next().unwrap_or_default().to_string();
        Self {
            verb,
            args: fields.map(str::to_string).collect(),
        }
    }

    /// Returns argument `index`, or `None` when the frame is too short.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Returns argument `index`, failing with [`ProtocolError::MissingField`].
    pub fn require(&self, index: usize) -> Result<&str, ProtocolError> {
        self.field(index).ok_or_else(|| ProtocolError::MissingField {
            verb: self.verb.clone(),
            index,
        })
    }

    /// Re-joins the arguments from `start` onwards with `:`.
    ///
    /// Message bodies and `;`-separated lists may themselves contain
    /// colons, which the tokenizer split apart.
    pub fn rest(&self, start: usize) -> String {
        self.args.get(start..).map(|a| a.join(":")).unwrap_or_default()
    }
}

/// One decoded inbound frame.
///
/// The empty frame is the server's keep-alive echo. It is a distinct
/// variant so it can never be confused with a command whose verb happens
/// to be the empty string (the payload `":"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Zero-length frame (keep-alive acknowledgment).
    Pong,
    /// A regular `verb[:arg]*` frame.
    Command(Command),
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// The coloured channel a post was sent on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    None,
    Red,
    Blue,
    Both,
}

/// Client-side channel bits: bit 0 red, bit 1 blue, bit 2 moderator badge.
///
/// On the wire these live at bits 8, 11 and 12 of a larger integer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ChannelFlags(pub u8);

impl ChannelFlags {
    pub const RED: u8 = 0b001;
    pub const BLUE: u8 = 0b010;
    pub const MOD: u8 = 0b100;

    /// Decodes the server's channel bitfield.
    ///
    /// Shift right 8 and keep 5 bits; bit 0 stays, bits 3 and 4 fold down
    /// into bits 1 and 2.
    pub fn from_wire(raw: u32) -> Self {
        let bits = (raw >> 8) & 0b1_1111;
        let folded = (bits & 1) | ((bits & 0b1000) >> 2) | ((bits & 0b1_0000) >> 2);
        Self(folded as u8)
    }

    /// Encodes back to the wire bitfield used by outbound `bm` commands.
    pub fn to_wire(self) -> u32 {
        let bits = u32::from(self.0);
        ((bits & 1) << 8) | ((bits & 0b010) << 10) | ((bits & 0b100) << 10)
    }

    /// The red/blue part of the flags.
    pub fn channel(self) -> Channel {
        match self.0 & 0b11 {
            0 => Channel::None,
            1 => Channel::Red,
            2 => Channel::Blue,
            _ => Channel::Both,
        }
    }

    /// Whether the moderator badge bit is set.
    pub fn is_mod(self) -> bool {
        self.0 & Self::MOD != 0
    }
}

impl From<Channel> for ChannelFlags {
    fn from(channel: Channel) -> Self {
        Self(match channel {
            Channel::None => 0,
            Channel::Red => Self::RED,
            Channel::Blue => Self::BLUE,
            Channel::Both => Self::RED | Self::BLUE,
        })
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Inline formatting carried in a post's `<n/>` and `<f>` tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formatting {
    /// Hex name colour. Always empty for anonymous authors.
    pub name_color: String,
    /// Hex font colour; empty means the client default.
    pub font_color: String,
    /// Font size in points.
    pub font_size: u8,
    /// Index into the server's font-face table.
    pub font_face: u8,
}

impl Formatting {
    /// Smallest font size the server accepts.
    pub const MIN_FONT_SIZE: u8 = 9;
    /// Largest font size the server accepts.
    pub const MAX_FONT_SIZE: u8 = 22;
    /// Font size used for our own outgoing posts until changed.
    pub const DEFAULT_FONT_SIZE: u8 = 12;

    /// Returns a copy with the font size clamped into 9–22.
    pub fn with_font_size(mut self, size: u8) -> Self {
        self.font_size = size.clamp(Self::MIN_FONT_SIZE, Self::MAX_FONT_SIZE);
        self
    }
}

impl Default for Formatting {
    fn default() -> Self {
        Self {
            name_color: "000".into(),
            font_color: "000".into(),
            font_size: Self::DEFAULT_FONT_SIZE,
            font_face: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// How the author of a post logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    /// Registered account.
    Registered,
    /// Session-only name, shown with a `#` prefix.
    Temporary,
    /// No name at all, shown as `!anon` plus a derived four-digit id.
    Anonymous,
}

/// The author of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Display name including the temporary/anonymous prefix.
    pub name: String,
    pub kind: AuthorKind,
}

impl Author {
    /// Prefix marking a temporary name.
    pub const TEMP_PREFIX: &'static str = "#";
    /// Prefix marking an anonymous id.
    pub const ANON_PREFIX: &'static str = "!anon";

    pub fn registered(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AuthorKind::Registered,
        }
    }

    pub fn temporary(name: &str) -> Self {
        Self {
            name: format!("{}{name}", Self::TEMP_PREFIX),
            kind: AuthorKind::Temporary,
        }
    }

    pub fn anonymous(anon_id: &str) -> Self {
        Self {
            name: format!("{}{anon_id}", Self::ANON_PREFIX),
            kind: AuthorKind::Anonymous,
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A post's identifier.
///
/// Live posts arrive with a provisional number and are confirmed later
/// with a permanent id; history replays carry the permanent id directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PostId {
    Provisional(String),
    Permanent(String),
}

impl PostId {
    /// The permanent id, if this post has been confirmed.
    pub fn permanent(&self) -> Option<&str> {
        match self {
            Self::Permanent(id) => Some(id),
            Self::Provisional(_) => None,
        }
    }
}

/// A chat message.
///
/// Constructed once by the post parser and never mutated; confirming a
/// provisional post produces a new value via [`Post::confirmed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Server timestamp in seconds.
    pub time: f64,
    pub author: Author,
    /// The poster's per-connection session id.
    pub session_id: String,
    /// The poster's stable user id (moderation target).
    pub unid: String,
    pub id: PostId,
    /// Origin IP as reported by the server. Used for moderation only.
    pub ip: String,
    pub channel: ChannelFlags,
    pub formatting: Formatting,
    /// Plain text body.
    pub body: String,
}

impl Post {
    /// Returns this post re-identified by its permanent message id.
    pub fn confirmed(self, message_id: impl Into<String>) -> Self {
        Self {
            id: PostId::Permanent(message_id.into()),
            ..self
        }
    }
}

// ---------------------------------------------------------------------------
// BanRecord
// ---------------------------------------------------------------------------

/// One entry of a room's ban list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanRecord {
    /// User id of the banned session.
    pub unid: String,
    pub ip: String,
    /// Display name of the banned user.
    pub target: String,
    /// When the ban was placed, in server seconds.
    pub time: f64,
    /// Moderator who placed the ban.
    pub moderator: String,
}
