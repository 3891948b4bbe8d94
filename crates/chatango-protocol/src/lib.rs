//! Wire-level protocol for the chatango chat service.
//!
//! This crate is pure: no sockets, no tasks, no clocks. It turns bytes
//! into [`Frame`]s, frames into [`Post`]s, and outgoing intentions into
//! encoded [`Command`]s.
//!
//! ## Layout
//!
//! - [`codec`]: NUL-delimited framing and command serialization
//! - [`post`]: `b`/`i` frame decoding and `bm` command construction
//! - [`html`]: the tag, entity and line-break handling inside bodies
//! - [`identity`]: anonymous display ids and session ids
//! - [`types`]: the shared data types
//!
//! Note: `bauth` frames carry the account password in clear text. Nothing
//! in this crate logs frame contents; callers must not either.

pub mod codec;
mod error;
pub mod html;
pub mod identity;
pub mod post;
pub mod types;

pub use codec::{decode_frame, encode_command, FrameDecoder, MAX_FRAME_LEN, PING};
pub use error::ProtocolError;
pub use identity::{anon_id, anon_seed, generate_session_id, DEFAULT_ANON_SEED};
pub use post::{
    encode_body, fit_body, parse_post, post_command, split_body, OverflowPolicy, PostOptions,
    PostSource, MAX_POST_LENGTH,
};
pub use types::{
    Author, AuthorKind, BanRecord, Channel, ChannelFlags, Command, Formatting, Frame, Post, PostId,
};
