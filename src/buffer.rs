//! Fixed-capacity byte buffer with explicit fill and drain cursors.
//!
//! Each connection owns two of these: one filled from the socket and
//! drained by the frame decoders, one filled by the frame encoder and
//! drained by socket writes. The buffer never grows; frames that cannot
//! fit are rejected at the decoder or encoder level, not absorbed here.

/// A bounded buffer of bytes.
///
/// Bytes are appended at the fill cursor and removed from the front.
/// `consume` compacts in place so the unconsumed tail always starts at
/// offset 0, which keeps both decoders and socket writes working on a
/// single contiguous slice.
#[derive(Debug)]
pub struct ByteBuffer {
    buf: Vec<u8>,
    len: usize,
}

impl ByteBuffer {
    /// Create a buffer with a fixed capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            len: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of filled bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no bytes are filled.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of room left before the buffer is full.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    /// True if at least one more byte can be appended.
    pub fn has_room(&self) -> bool {
        self.len < self.buf.len()
    }

    /// The filled portion of the buffer.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The unfilled portion, for reads directly into the buffer.
    ///
    /// Call [`advance`](Self::advance) afterwards with the number of
    /// bytes actually written.
    pub fn unfilled_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Mark `n` additional bytes as filled.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.len + n <= self.buf.len(), "advance past capacity");
        self.len += n;
    }

    /// Drop the first `n` filled bytes and compact the remainder to the
    /// front of the buffer.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len, "consume past fill level");
        self.buf.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Append a slice if it fits entirely; returns false otherwise.
    pub fn put_slice(&mut self, src: &[u8]) -> bool {
        if src.len() > self.remaining() {
            return false;
        }
        self.buf[self.len..self.len + src.len()].copy_from_slice(src);
        self.len += src.len();
        true
    }

    /// Append a big-endian u32 if it fits; returns false otherwise.
    pub fn put_u32(&mut self, value: u32) -> bool {
        self.put_slice(&value.to_be_bytes())
    }

    /// Discard all filled bytes.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_consume() {
        let mut buf = ByteBuffer::with_capacity(8);
        assert!(buf.is_empty());
        assert_eq!(buf.remaining(), 8);

        assert!(buf.put_slice(b"abcdef"));
        assert_eq!(buf.filled(), b"abcdef");
        assert_eq!(buf.remaining(), 2);

        buf.consume(2);
        assert_eq!(buf.filled(), b"cdef");
        assert_eq!(buf.remaining(), 4);

        // Compaction freed room at the back
        assert!(buf.put_slice(b"ghij"));
        assert_eq!(buf.filled(), b"cdefghij");
        assert!(!buf.has_room());
    }

    #[test]
    fn test_put_rejects_oversized() {
        let mut buf = ByteBuffer::with_capacity(4);
        assert!(buf.put_slice(b"ab"));
        // Would overflow; buffer left untouched
        assert!(!buf.put_slice(b"cde"));
        assert_eq!(buf.filled(), b"ab");
        assert!(!buf.put_u32(7));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_put_u32_big_endian() {
        let mut buf = ByteBuffer::with_capacity(4);
        assert!(buf.put_u32(0x0102_0304));
        assert_eq!(buf.filled(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_unfilled_advance() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.unfilled_mut()[..3].copy_from_slice(b"xyz");
        buf.advance(3);
        assert_eq!(buf.filled(), b"xyz");
        assert_eq!(buf.unfilled_mut().len(), 1);
    }

    #[test]
    fn test_consume_all_then_refill() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.put_slice(b"abcd");
        buf.consume(4);
        assert!(buf.is_empty());
        assert!(buf.put_slice(b"wxyz"));
        assert_eq!(buf.filled(), b"wxyz");
    }
}
