//! Frame splitting and command serialization.
//!
//! The chatango stream is a sequence of text frames separated by a single
//! NUL byte. TCP gives us no message boundaries, so a read may contain half
//! a frame, several frames, or a frame split across two reads. The
//! [`FrameDecoder`] keeps the unterminated tail between calls, which makes
//! its output independent of how the bytes were chunked.
//!
//! ## Outbound
//!
//! Commands are `verb:arg:arg...`. The very first command on a connection
//! (`bauth` or `v`) is terminated by `\0` alone; every later command ends
//! in `\r\n\0`. The keep-alive ping is the bare terminator `\r\n\0`.

use memchr::memchr;

use crate::types::{Command, Frame};
use crate::ProtocolError;

/// The frame separator.
pub const FRAME_TERMINATOR: u8 = 0;

/// The keep-alive ping: an empty command with the regular terminator.
pub const PING: &[u8] = b"\r\n\0";

/// Default cap on a single frame, terminator excluded.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Longest lossy preview of a bad frame kept for diagnostics.
const PREVIEW_LEN: usize = 64;

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// Incremental NUL-delimited frame splitter.
///
/// ## Example
///
/// ```rust
/// use chatango_protocol::{FrameDecoder, Frame};
///
/// let mut decoder = FrameDecoder::new();
/// assert!(decoder.feed(b"n:1").is_empty());
///
/// let frames = decoder.feed(b"f\r\n\0\0");
/// assert_eq!(frames.len(), 2);
/// assert_eq!(frames[1], Ok(Frame::Pong));
/// ```
///
/// A frame longer than the configured cap is reported once as
/// [`ProtocolError::FrameTooLarge`] and its bytes are skipped up to the next
/// terminator, so the buffer never holds more than the cap plus one read.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
    /// Skipping the rest of an oversized frame.
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
            discarding: false,
        }
    }

    /// Appends `bytes` and returns every frame they completed, in order.
    ///
    /// A frame that fails to decode is returned as an `Err` in its slot;
    /// the frames after it are unaffected.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Frame, ProtocolError>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = memchr(FRAME_TERMINATOR, &self.buffer[consumed..]) {
            let end = consumed + pos;
            if self.discarding {
                self.discarding = false;
            } else if pos > self.max_frame_len {
                frames.push(Err(self.too_large()));
            } else {
                let frame = decode_frame(&self.buffer[consumed..end]);
                if let Ok(Frame::Command(cmd)) = &frame {
                    tracing::trace!(verb = %cmd.verb, len = pos, "frame decoded");
                }
                frames.push(frame);
            }
            consumed = end + 1;
        }
        if consumed > 0 {
            self.buffer.drain(..consumed);
        }

        if self.buffer.len() > self.max_frame_len {
            if !self.discarding {
                frames.push(Err(self.too_large()));
                self.discarding = true;
            }
            self.buffer.clear();
        }
        frames
    }

    fn too_large(&self) -> ProtocolError {
        tracing::warn!(max = self.max_frame_len, "oversized frame skipped");
        ProtocolError::FrameTooLarge {
            max: self.max_frame_len,
        }
    }

    /// Number of buffered bytes still waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Decodes one frame (without its NUL terminator).
///
/// Trailing `\r`/`\n` are stripped. What remains empty is a [`Frame::Pong`].
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|_| {
        let lossy = String::from_utf8_lossy(bytes);
        ProtocolError::InvalidUtf8(lossy.chars().take(PREVIEW_LEN).collect())
    })?;

    let text = text.trim_end_matches(['\r', '\n']);
    if text.is_empty() {
        return Ok(Frame::Pong);
    }
    Ok(Frame::Command(Command::parse(text)))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serializes a verb and its arguments.
///
/// `first` selects the connection-opening terminator (`\0` only).
pub fn encode_command(verb: &str, args: &[&str], first: bool) -> Vec<u8> {
    let args_len: usize = args.iter().map(|a| a.len() + 1).sum();
    let mut out = String::with_capacity(verb.len() + args_len + 3);
    out.push_str(verb);
    for arg in args {
        out.push(':');
        out.push_str(arg);
    }
    if !first {
        out.push_str("\r\n");
    }
    let mut bytes = out.into_bytes();
    bytes.push(FRAME_TERMINATOR);
    bytes
}

impl Command {
    /// Serializes this command. See [`encode_command`].
    pub fn encode(&self, first: bool) -> Vec<u8> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        encode_command(&self.verb, &args, first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(frame: &Result<Frame, ProtocolError>) -> &Command {
        match frame {
            Ok(Frame::Command(c)) => c,
            other => panic!("expected command, got {other:?}"),
        }
    }

    // =====================================================================
    // FrameDecoder
    // =====================================================================

    #[test]
    fn test_feed_returns_each_complete_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"inited\r\n\0n:a\r\n\0");
        assert_eq!(frames.len(), 2);
        assert_eq!(cmd(&frames[0]).verb, "inited");
        assert_eq!(cmd(&frames[1]).args, vec!["a".to_string()]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_feed_keeps_unterminated_tail() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"premium:1").is_empty());
        assert_eq!(decoder.pending(), 9);

        let frames = decoder.feed(b"\0");
        assert_eq!(cmd(&frames[0]).verb, "premium");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_feed_empty_frame_is_pong() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"\r\n\0\0");
        assert_eq!(frames, vec![Ok(Frame::Pong), Ok(Frame::Pong)]);
    }

    #[test]
    fn test_feed_colon_frame_is_not_pong() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b":\0");
        assert_eq!(cmd(&frames[0]).verb, "");
    }

    #[test]
    fn test_feed_oversized_frame_in_one_read_is_skipped() {
        let mut decoder = FrameDecoder::with_max_frame_len(8);
        let frames = decoder.feed(b"n:123456789\0n:1\0");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Err(ProtocolError::FrameTooLarge { max: 8 }));
        assert_eq!(cmd(&frames[1]).args, vec!["1".to_string()]);
    }

    #[test]
    fn test_feed_oversized_frame_across_reads_is_skipped_once() {
        let mut decoder = FrameDecoder::with_max_frame_len(8);
        assert!(decoder.feed(b"n:1234").is_empty());
        let frames = decoder.feed(b"56789");
        assert_eq!(frames, vec![Err(ProtocolError::FrameTooLarge { max: 8 })]);
        assert_eq!(decoder.pending(), 0);

        assert!(decoder.feed(b"more junk").is_empty());
        assert_eq!(decoder.pending(), 0);

        let frames = decoder.feed(b"tail\0n:1\0");
        assert_eq!(frames.len(), 1);
        assert_eq!(cmd(&frames[0]).args, vec!["1".to_string()]);
    }

    #[test]
    fn test_feed_frame_at_cap_is_kept() {
        let mut decoder = FrameDecoder::with_max_frame_len(8);
        assert!(decoder.feed(b"n:123456").is_empty());
        let frames = decoder.feed(b"\0");
        assert_eq!(cmd(&frames[0]).args, vec!["123456".to_string()]);
    }

    #[test]
    fn test_feed_bad_utf8_is_isolated() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"n:1\0\xff\xfe\0n:2\0");
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[1], Err(ProtocolError::InvalidUtf8(_))));
        assert_eq!(cmd(&frames[2]).args[0], "2");
    }

    #[test]
    fn test_decode_frame_strips_only_trailing_line_endings() {
        let frame = decode_frame(b"b:1:hello\r\n").unwrap();
        assert_eq!(
            frame,
            Frame::Command(Command::new("b").arg("1").arg("hello"))
        );
    }

    // =====================================================================
    // Encoding
    // =====================================================================

    #[test]
    fn test_encode_first_command_has_nul_only() {
        let bytes = encode_command("bauth", &["room", "123", "", ""], true);
        assert_eq!(bytes, b"bauth:room:123::\0");
    }

    #[test]
    fn test_encode_later_command_has_crlf_nul() {
        let bytes = Command::new("get_more").arg("20").arg("1").encode(false);
        assert_eq!(bytes, b"get_more:20:1\r\n\0");
    }

    #[test]
    fn test_encode_no_args() {
        assert_eq!(encode_command("getpremium", &[], false), b"getpremium\r\n\0");
    }

    #[test]
    fn test_ping_decodes_as_pong() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(PING), vec![Ok(Frame::Pong)]);
    }
}
