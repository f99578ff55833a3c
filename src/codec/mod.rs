//! Incremental frame codec for the chat wire protocol.
//!
//! The wire format is a stream of length-prefixed frames:
//!
//! ```text
//! String frame:  <u32 big-endian length><length bytes of UTF-8>
//! Message:       <login string frame><text string frame>
//! ```
//!
//! Frames may be split at arbitrary byte boundaries across socket reads,
//! and multiple messages may arrive back-to-back in a single read. Each
//! decoder therefore retains its parsing progress between `process` calls
//! and reports whether it completed, needs more input, or hit malformed
//! data.

mod int;
mod message;
mod string;

pub use int::U32Decoder;
pub use message::MessageDecoder;
pub use string::StringDecoder;

use crate::buffer::ByteBuffer;

/// Maximum payload length of a single string frame, in bytes.
///
/// A length prefix above this (or any value that would be negative as a
/// signed 32-bit integer) is a protocol violation.
pub const MAX_FRAME_LEN: usize = 1024;

/// Encoded size of the largest possible message: two length prefixes
/// plus two maximum payloads.
pub const MAX_MESSAGE_LEN: usize = 2 * 4 + 2 * MAX_FRAME_LEN;

/// One chat message: who said it and what was said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub login: String,
    pub text: String,
}

impl Message {
    pub fn new(login: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            text: text.into(),
        }
    }

    /// Number of bytes this message occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        2 * 4 + self.login.len() + self.text.len()
    }
}

/// Outcome of a single `process` call on a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// A complete value is available from the decoder.
    Done,
    /// Not enough input yet; feed more bytes and call again.
    Refill,
    /// The input violates the wire format. Sticky until `reset`.
    Error,
}

/// A resumable incremental parser over buffered bytes.
///
/// `process` consumes from the front of `buf` only what it needs; on
/// [`DecodeStatus::Done`] any bytes belonging to the next frame are left
/// in place. After `Done` the value is retrieved once with `take`, and
/// `reset` prepares the decoder for the next frame. After
/// [`DecodeStatus::Error`] only `reset` is valid.
pub trait Decoder {
    type Output;

    fn process(&mut self, buf: &mut ByteBuffer) -> DecodeStatus;

    /// Take the decoded value. Returns `None` unless the last `process`
    /// reported `Done` and the value has not been taken yet.
    fn take(&mut self) -> Option<Self::Output>;

    fn reset(&mut self);
}

/// Encode a message as two consecutive string frames into `out`.
///
/// The frames are written atomically: if the full encoding does not fit
/// in the buffer's remaining room, nothing is written and `false` is
/// returned.
pub fn encode_message(msg: &Message, out: &mut ByteBuffer) -> bool {
    if msg.encoded_len() > out.remaining() {
        return false;
    }
    // Room was checked up front, so none of these can fail.
    out.put_u32(msg.login.len() as u32);
    out.put_slice(msg.login.as_bytes());
    out.put_u32(msg.text.len() as u32);
    out.put_slice(msg.text.as_bytes());
    true
}

#[cfg(test)]
pub(crate) fn encode_to_vec(msg: &Message) -> Vec<u8> {
    let mut out = ByteBuffer::with_capacity(msg.encoded_len());
    assert!(encode_message(msg, &mut out));
    out.filled().to_vec()
}
