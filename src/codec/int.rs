//! Decoder for a big-endian u32, used as the length prefix of a frame.

use crate::buffer::ByteBuffer;
use crate::codec::{DecodeStatus, Decoder};

/// Accumulates exactly four bytes into a big-endian u32.
///
/// Length prefixes routinely straddle read boundaries, so the partial
/// bytes are kept between `process` calls. This decoder never reports
/// an error; validating the decoded value is the caller's job.
#[derive(Debug, Default)]
pub struct U32Decoder {
    bytes: [u8; 4],
    have: usize,
    value: Option<u32>,
}

impl U32Decoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for U32Decoder {
    type Output = u32;

    fn process(&mut self, buf: &mut ByteBuffer) -> DecodeStatus {
        if self.value.is_some() {
            return DecodeStatus::Done;
        }
        let missing = 4 - self.have;
        let n = missing.min(buf.len());
        self.bytes[self.have..self.have + n].copy_from_slice(&buf.filled()[..n]);
        buf.consume(n);
        self.have += n;
        if self.have < 4 {
            return DecodeStatus::Refill;
        }
        self.value = Some(u32::from_be_bytes(self.bytes));
        DecodeStatus::Done
    }

    fn take(&mut self) -> Option<u32> {
        self.value
    }

    fn reset(&mut self) {
        self.have = 0;
        self.value = None;
    }
}
