//! Error types for the protocol layer.
//!
//! Protocol errors are never fatal to a session: a frame that fails to
//! decode or parse is reported and skipped, and the read loop carries on
//! with the next one.

/// Errors that can occur while decoding frames or parsing their fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A complete frame was not valid UTF-8.
    ///
    /// Carries a lossy rendering of the frame for logging.
    #[error("frame is not valid UTF-8: {0:?}")]
    InvalidUtf8(String),

    /// A numeric field (timestamp, channel bits, user count) did not parse.
    #[error("invalid {field} {value:?} in `{verb}` frame")]
    InvalidNumber {
        verb: String,
        field: &'static str,
        value: String,
    },

    /// A frame had fewer fields than its verb requires.
    #[error("`{verb}` frame is missing field {index}")]
    MissingField { verb: String, index: usize },

    /// A frame grew past the decoder's size cap before its terminator.
    #[error("frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },
}
