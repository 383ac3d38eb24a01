//! Line framing for the receiver control protocol.
//!
//! Every command and every report is plain ASCII terminated by a carriage
//! return. Some firmware also emits a stray line feed, which is dropped.
//! Bytes that are not valid UTF-8 are replaced rather than rejected so one
//! garbled report cannot stall the reader.

use bytes::{BufMut, BytesMut};

pub use avrctl_core::command::TERMINATOR;

/// Maximum buffered bytes without a terminator before the buffer is reset.
/// Report lines are typically under 30 bytes; 8192 is generous headroom.
pub const MAX_BUF: usize = 8192;

/// Result of attempting to decode one line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete line was decoded.
    Line {
        /// Line text without terminator or line feeds.
        text: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// The buffer does not yet contain a terminator.
    Incomplete,
}

/// Encode a line body with its terminator.
///
/// ```
/// use avrctl_text_io::protocol::encode_line;
///
/// assert_eq!(encode_line("PW?"), b"PW?\r");
/// ```
pub fn encode_line(body: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(body.len() + 1);
    buf.put_slice(body.as_bytes());
    buf.put_u8(TERMINATOR);
    buf.to_vec()
}

/// Decode one carriage-return terminated line from the front of `buf`.
pub fn decode_line(buf: &[u8]) -> DecodeResult {
    let term_pos = match buf.iter().position(|&b| b == TERMINATOR) {
        Some(pos) => pos,
        None => return DecodeResult::Incomplete,
    };

    let body: Vec<u8> = buf[..term_pos]
        .iter()
        .copied()
        .filter(|&b| b != b'\n')
        .collect();

    DecodeResult::Line {
        text: String::from_utf8_lossy(&body).into_owned(),
        consumed: term_pos + 1,
    }
}
