//! Decoder for a length-prefixed UTF-8 string frame.

use bytes::BytesMut;

use crate::buffer::ByteBuffer;
use crate::codec::{DecodeStatus, Decoder, U32Decoder, MAX_FRAME_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingLength,
    WaitingBytes,
    Done,
    Failed,
}

/// Decodes one string frame: a u32 length prefix followed by that many
/// bytes of UTF-8.
///
/// The length is read through an owned [`U32Decoder`] and validated
/// against [`MAX_FRAME_LEN`]; anything larger (which also covers values
/// that would be negative as a signed 32-bit integer) is a protocol
/// error and sticks until `reset`. Payload bytes are accumulated across
/// as many `process` calls as it takes, then decoded with invalid
/// sequences replaced, matching the tolerance of the wire peers.
#[derive(Debug)]
pub struct StringDecoder {
    state: State,
    length: U32Decoder,
    size: usize,
    acc: BytesMut,
    value: Option<String>,
}

impl StringDecoder {
    pub fn new() -> Self {
        Self {
            state: State::WaitingLength,
            length: U32Decoder::new(),
            size: 0,
            acc: BytesMut::with_capacity(MAX_FRAME_LEN),
            value: None,
        }
    }
}

impl Default for StringDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StringDecoder {
    type Output = String;

    fn process(&mut self, buf: &mut ByteBuffer) -> DecodeStatus {
        if self.state == State::Failed {
            return DecodeStatus::Error;
        }
        if self.state == State::WaitingLength {
            match self.length.process(buf) {
                DecodeStatus::Refill => return DecodeStatus::Refill,
                DecodeStatus::Error => {
                    self.state = State::Failed;
                    return DecodeStatus::Error;
                }
                DecodeStatus::Done => {
                    // take() cannot fail right after Done
                    let size = self.length.take().unwrap_or(0) as usize;
                    if size > MAX_FRAME_LEN {
                        self.state = State::Failed;
                        return DecodeStatus::Error;
                    }
                    self.size = size;
                    self.state = State::WaitingBytes;
                }
            }
        }
        if self.state == State::WaitingBytes {
            let missing = self.size - self.acc.len();
            let n = missing.min(buf.len());
            self.acc.extend_from_slice(&buf.filled()[..n]);
            buf.consume(n);
            if self.acc.len() < self.size {
                return DecodeStatus::Refill;
            }
            self.value = Some(String::from_utf8_lossy(&self.acc).into_owned());
            self.state = State::Done;
        }
        DecodeStatus::Done
    }

    fn take(&mut self) -> Option<String> {
        self.value.take()
    }

    fn reset(&mut self) {
        self.state = State::WaitingLength;
        self.length.reset();
        self.size = 0;
        self.acc.clear();
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_decode_whole_frame() {
        let mut buf = ByteBuffer::with_capacity(32);
        buf.put_slice(&frame("héllo".as_bytes()));
        let mut dec = StringDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take().as_deref(), Some("héllo"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_split_anywhere() {
        let encoded = frame(b"incremental");
        for split in 1..encoded.len() {
            let mut dec = StringDecoder::new();
            let mut buf = ByteBuffer::with_capacity(encoded.len());
            buf.put_slice(&encoded[..split]);
            let first = dec.process(&mut buf);
            buf.put_slice(&encoded[split..]);
            let second = dec.process(&mut buf);
            assert_eq!(first, DecodeStatus::Refill, "split at {split}");
            assert_eq!(second, DecodeStatus::Done, "split at {split}");
            assert_eq!(dec.take().as_deref(), Some("incremental"));
        }
    }

    #[test]
    fn test_empty_string() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.put_u32(0);
        let mut dec = StringDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take().as_deref(), Some(""));
    }

    #[test]
    fn test_max_frame_len_ok() {
        let payload = vec![b'x'; MAX_FRAME_LEN];
        let mut buf = ByteBuffer::with_capacity(MAX_FRAME_LEN + 4);
        buf.put_slice(&frame(&payload));
        let mut dec = StringDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take().map(|s| s.len()), Some(MAX_FRAME_LEN));
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_rejected() {
        let mut buf = ByteBuffer::with_capacity(16);
        buf.put_slice(&frame(&[b'a', 0xFF, b'b']));
        let mut dec = StringDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take().as_deref(), Some("a\u{FFFD}b"));
    }

    #[test]
    fn test_over_limit_length_is_error() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.put_u32((MAX_FRAME_LEN + 1) as u32);
        let mut dec = StringDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Error);
    }

    #[test]
    fn test_negative_length_is_error() {
        // A negative i32 length on the wire arrives as a huge u32
        let mut buf = ByteBuffer::with_capacity(8);
        buf.put_u32(u32::MAX);
        let mut dec = StringDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Error);
    }

    #[test]
    fn test_error_is_sticky_until_reset() {
        let mut buf = ByteBuffer::with_capacity(32);
        buf.put_u32(u32::MAX);
        let mut dec = StringDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Error);
        assert_eq!(dec.process(&mut buf), DecodeStatus::Error);

        dec.reset();
        buf.clear();
        buf.put_slice(&frame(b"fresh"));
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_reset_leaks_no_state() {
        let mut buf = ByteBuffer::with_capacity(64);
        buf.put_slice(&frame(b"first"));
        let mut dec = StringDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take().as_deref(), Some("first"));

        dec.reset();
        buf.put_slice(&frame(b"second"));
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        // Nothing of "first" survives the reset
        assert_eq!(dec.take().as_deref(), Some("second"));
    }
}
