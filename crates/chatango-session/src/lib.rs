//! Everything a room session needs before its socket opens.
//!
//! 1. **Credentials**: who we log in as ([`Credentials`], [`LoginMode`])
//! 2. **Shard resolution**: which server hosts a room ([`resolve_shard`])
//! 3. **Account calls**: HTTP-only operations outside the chat protocol
//!    ([`AccountService`], [`HttpAccountService`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)      ← resolves the shard, sends auth_command on connect
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← provides Command
//! ```

mod auth;
mod credentials;
mod error;
mod shard;

pub use auth::{AccountConfig, AccountService, HttpAccountService};
pub use credentials::{Credentials, LoginMode};
pub use error::SessionError;
pub use shard::{resolve_shard, shard_host, SHARD_WEIGHTS, SPECIAL_ROOMS};
