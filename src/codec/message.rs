//! Decoder for a chat message: two consecutive string frames.

use crate::buffer::ByteBuffer;
use crate::codec::{DecodeStatus, Decoder, Message, StringDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingLogin,
    WaitingText,
    Done,
    Failed,
}

/// Decodes a [`Message`] by running one owned [`StringDecoder`] twice:
/// once for the login, once for the text, with a `reset` in between.
///
/// The login is captured into this decoder before the sub-decoder is
/// reset, so no reference into its transient accumulator survives the
/// phase change. Either sub-decode can span any number of `process`
/// calls; a sub-decoder error makes this decoder fail until `reset`.
#[derive(Debug)]
pub struct MessageDecoder {
    state: State,
    string: StringDecoder,
    login: Option<String>,
    value: Option<Message>,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self {
            state: State::WaitingLogin,
            string: StringDecoder::new(),
            login: None,
            value: None,
        }
    }
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageDecoder {
    type Output = Message;

    fn process(&mut self, buf: &mut ByteBuffer) -> DecodeStatus {
        if self.state == State::Failed {
            return DecodeStatus::Error;
        }
        if self.state == State::WaitingLogin {
            match self.string.process(buf) {
                DecodeStatus::Refill => return DecodeStatus::Refill,
                DecodeStatus::Error => {
                    self.state = State::Failed;
                    return DecodeStatus::Error;
                }
                DecodeStatus::Done => {
                    self.login = self.string.take();
                    self.string.reset();
                    self.state = State::WaitingText;
                }
            }
        }
        if self.state == State::WaitingText {
            match self.string.process(buf) {
                DecodeStatus::Refill => return DecodeStatus::Refill,
                DecodeStatus::Error => {
                    self.state = State::Failed;
                    return DecodeStatus::Error;
                }
                DecodeStatus::Done => {
                    let login = self.login.take().unwrap_or_default();
                    let text = self.string.take().unwrap_or_default();
                    self.value = Some(Message { login, text });
                    self.state = State::Done;
                }
            }
        }
        DecodeStatus::Done
    }

    fn take(&mut self) -> Option<Message> {
        self.value.take()
    }

    fn reset(&mut self) {
        self.state = State::WaitingLogin;
        self.string.reset();
        self.login = None;
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_to_vec, MAX_FRAME_LEN};

    #[test]
    fn test_decode_whole_message() {
        let msg = Message::new("alice", "hi there");
        let mut buf = ByteBuffer::with_capacity(64);
        buf.put_slice(&encode_to_vec(&msg));
        let mut dec = MessageDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take(), Some(msg));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_round_trip_at_every_split_point() {
        let msg = Message::new("böb", "chat says héllo");
        let encoded = encode_to_vec(&msg);
        for split in 1..encoded.len() {
            let mut dec = MessageDecoder::new();
            let mut buf = ByteBuffer::with_capacity(encoded.len());
            buf.put_slice(&encoded[..split]);
            assert_eq!(dec.process(&mut buf), DecodeStatus::Refill, "split {split}");
            buf.put_slice(&encoded[split..]);
            assert_eq!(dec.process(&mut buf), DecodeStatus::Done, "split {split}");
            assert_eq!(dec.take().as_ref(), Some(&msg), "split {split}");
        }
    }

    #[test]
    fn test_resumable_over_many_chunks() {
        let msg = Message::new("carol", "x".repeat(300));
        let encoded = encode_to_vec(&msg);
        let mut dec = MessageDecoder::new();
        let mut buf = ByteBuffer::with_capacity(encoded.len());
        let mut done = 0;
        for chunk in encoded.chunks(7) {
            buf.put_slice(chunk);
            if dec.process(&mut buf) == DecodeStatus::Done {
                done += 1;
            }
        }
        // Exactly one completion regardless of chunking
        assert_eq!(done, 1);
        assert_eq!(dec.take(), Some(msg));
    }

    #[test]
    fn test_two_messages_back_to_back() {
        let first = Message::new("a", "one");
        let second = Message::new("b", "two");
        let mut buf = ByteBuffer::with_capacity(64);
        buf.put_slice(&encode_to_vec(&first));
        buf.put_slice(&encode_to_vec(&second));

        let mut dec = MessageDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take(), Some(first));
        dec.reset();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take(), Some(second));
        dec.reset();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Refill);
    }

    #[test]
    fn test_bad_text_length_fails_after_good_login() {
        let mut buf = ByteBuffer::with_capacity(32);
        buf.put_u32(3);
        buf.put_slice(b"eve");
        buf.put_u32((MAX_FRAME_LEN + 1) as u32);
        let mut dec = MessageDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Error);
        // Sticky until reset
        assert_eq!(dec.process(&mut buf), DecodeStatus::Error);
    }

    #[test]
    fn test_reset_after_error_recovers() {
        let mut dec = MessageDecoder::new();
        let mut buf = ByteBuffer::with_capacity(64);
        buf.put_u32(u32::MAX);
        assert_eq!(dec.process(&mut buf), DecodeStatus::Error);

        dec.reset();
        buf.clear();
        let msg = Message::new("dave", "back again");
        buf.put_slice(&encode_to_vec(&msg));
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take(), Some(msg));
    }

    #[test]
    fn test_no_state_leaks_between_messages() {
        let mut dec = MessageDecoder::new();
        let mut buf = ByteBuffer::with_capacity(128);
        buf.put_slice(&encode_to_vec(&Message::new("longlogin", "long first text")));
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        dec.take();
        dec.reset();

        let short = Message::new("z", "s");
        buf.put_slice(&encode_to_vec(&short));
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.take(), Some(short));
    }
}
