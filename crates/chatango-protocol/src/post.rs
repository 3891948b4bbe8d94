//! Decoding inbound `b`/`i` frames into [`Post`]s and building outbound
//! `bm` commands.
//!
//! ## Inbound layout
//!
//! Both live (`b`) and history (`i`) frames share the same fields:
//!
//! ```text
//! time : name : tname : sid : unid : id : ip : channel : (unused) : raw...
//! ```
//!
//! `raw` is the HTML body and may itself contain colons, so everything
//! from index 9 onwards is re-joined. For `b` the id is a provisional
//! number; for `i` it is the permanent message id.
//!
//! ## Outbound layout
//!
//! ```text
//! bm : msgid : channel : <nNAMECOLOR/><f xSSCOLOR="FACE">body</f>
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::html::{self, FontTag};
use crate::identity::anon_id;
use crate::types::{
    Author, Channel, ChannelFlags, Command, Formatting, Post, PostId,
};
use crate::ProtocolError;

/// Maximum body length the server accepts, after escaping.
pub const MAX_POST_LENGTH: usize = 2700;

/// Where a post frame came from. Determines the id kind and the font size
/// assumed when the font tag carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSource {
    /// A `b` frame: a post just made in the room.
    Live,
    /// An `i` frame: a post replayed from history.
    History,
}

impl PostSource {
    /// Font size assumed when the font tag has no size digits.
    pub fn default_font_size(self) -> u8 {
        match self {
            Self::Live => 11,
            Self::History => 12,
        }
    }
}

/// Parses the arguments of a `b` or `i` frame.
///
/// Only the numeric fields can fail: a missing or non-numeric timestamp,
/// or non-numeric channel bits. Missing text fields read as empty.
pub fn parse_post(cmd: &Command, source: PostSource) -> Result<Post, ProtocolError> {
    let time_raw = cmd.require(0)?;
    let time: f64 = time_raw.parse().map_err(|_| ProtocolError::InvalidNumber {
        verb: cmd.verb.clone(),
        field: "time",
        value: time_raw.to_string(),
    })?;

    let text = |index: usize| cmd.field(index).unwrap_or_default().to_string();
    let name = text(1);
    let tname = text(2);
    let session_id = text(3);
    let unid = text(4);
    let id = text(5);
    let ip = text(6);

    let channel_raw = cmd.field(7).unwrap_or_default();
    let channel = if channel_raw.is_empty() {
        ChannelFlags::default()
    } else {
        let raw: u32 = channel_raw.parse().map_err(|_| ProtocolError::InvalidNumber {
            verb: cmd.verb.clone(),
            field: "channel",
            value: channel_raw.to_string(),
        })?;
        ChannelFlags::from_wire(raw)
    };

    let raw = cmd.rest(9);
    let (name_tag, rest) = html::take_tag(&raw, "<n", "/>");
    let (font_tag, rest) = html::take_tag(&rest, "<f", ">");
    let FontTag { size, color, face } =
        html::parse_font_tag(font_tag.as_deref().unwrap_or_default(), source.default_font_size());
    let name_tag = name_tag.unwrap_or_default();

    let (author, name_color) = if !name.is_empty() {
        (Author::registered(name), name_tag)
    } else if !tname.is_empty() {
        (Author::temporary(&tname), name_tag)
    } else {
        (Author::anonymous(&anon_id(&name_tag, &session_id)), String::new())
    };

    let id = match source {
        PostSource::Live => PostId::Provisional(id),
        PostSource::History => PostId::Permanent(id),
    };

    Ok(Post {
        time,
        author,
        session_id,
        unid,
        id,
        ip,
        channel,
        formatting: Formatting {
            name_color,
            font_color: color,
            font_size: size,
            font_face: face,
        },
        body: html::clean_body(&rest),
    })
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// What to do with a body longer than the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Send only the first chunk.
    Truncate,
    /// Send every chunk as its own post, in order.
    #[default]
    Split,
}

/// Per-post options for outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostOptions {
    pub channel: Channel,
    /// Show the moderator badge (only honoured by the server for mods).
    pub mod_badge: bool,
    /// The body is already HTML and must not be escaped.
    pub html: bool,
}

impl PostOptions {
    fn channel_flags(&self) -> ChannelFlags {
        let mut flags = ChannelFlags::from(self.channel);
        if self.mod_badge {
            flags.0 |= ChannelFlags::MOD;
        }
        flags
    }
}

/// Converts a body to its wire form: HTML-escaped unless `html`, carriage
/// returns dropped, newlines sent as `\r`.
pub fn encode_body(text: &str, html: bool) -> String {
    let escaped = if html {
        text.to_string()
    } else {
        html::escape_text(text)
    };
    escaped
        .chars()
        .filter(|&c| c != '\r')
        .map(|c| if c == '\n' { '\r' } else { c })
        .collect()
}

fn encoded_len(c: char, html: bool) -> usize {
    match c {
        '\r' => 0,
        '&' if !html => 5,
        '<' | '>' if !html => 4,
        _ => 1,
    }
}

/// Splits `text` into encoded chunks of at most `max` characters each.
///
/// Splitting happens on the raw text, so an escape sequence is never cut
/// in half. Every chunk holds at least one raw character, which means a
/// single character whose escape exceeds `max` still produces a chunk.
pub fn split_body(text: &str, html: bool, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for c in text.chars() {
        let len = encoded_len(c, html);
        if current_len + len > max && !current.is_empty() {
            chunks.push(encode_body(&std::mem::take(&mut current), html));
            current_len = 0;
        }
        current.push(c);
        current_len += len;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(encode_body(&current, html));
    }
    chunks
}

/// Applies `policy` to a body, returning the encoded bodies to send.
pub fn fit_body(text: &str, html: bool, max: usize, policy: OverflowPolicy) -> Vec<String> {
    let mut chunks = split_body(text, html, max);
    if policy == OverflowPolicy::Truncate {
        chunks.truncate(1);
    }
    chunks
}

/// Builds a `bm` command for one already-encoded body chunk.
pub fn post_command(encoded_body: &str, formatting: &Formatting, options: &PostOptions) -> Command {
    let msg_id: u16 = rand::rng().random_range(1000..10000);
    let html = format!(
        "<n{}/><f x{:02}{}=\"{}\">{}</f>",
        formatting.name_color,
        formatting.font_size,
        formatting.font_color,
        formatting.font_face,
        encoded_body,
    );
    Command::new("bm")
        .arg(msg_id.to_string())
        .arg(options.channel_flags().to_wire().to_string())
        .arg(html)
}
