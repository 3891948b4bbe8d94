//! Error types for the session layer.

/// Errors that can occur while preparing a session or talking to the
/// account service.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The room name cannot be mapped to a shard.
    ///
    /// Room names are base-36 tokens (letters and digits, with `-` and `_`
    /// allowed as separators). Anything else has no server.
    #[error("malformed room name {0:?}")]
    MalformedRoomName(String),

    /// An account call needs a registered name and password.
    #[error("account call requires a name and password")]
    MissingCredentials,

    /// The login endpoint answered without an auth cookie.
    #[error("login rejected for {0}")]
    LoginRejected(String),

    /// The avatar image could not be read from disk.
    #[error("cannot read avatar {path}: {source}")]
    AvatarRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP request itself failed.
    #[error("account request failed: {0}")]
    Http(#[from] reqwest::Error),
}
