//! Per-connection state: buffers, outbound queue, and decoder.
//!
//! A `Context` bridges one socket's byte-level I/O to message-level
//! semantics. The reactor hands it readable/writable events; it feeds
//! bytes through its [`MessageDecoder`] on the way in and drains its
//! message queue through the frame encoder on the way out. All methods
//! are non-blocking: they only move bytes between the socket and the
//! buffers already owned by this context.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use mio::Interest;

use crate::buffer::ByteBuffer;
use crate::codec::{encode_message, DecodeStatus, Decoder, Message, MessageDecoder};

/// State for one connected socket.
///
/// Owned exclusively by the reactor's registration table; all mutation
/// happens on the reactor thread.
#[derive(Debug)]
pub struct Context {
    input: ByteBuffer,
    output: ByteBuffer,
    queue: VecDeque<Message>,
    decoder: MessageDecoder,
    closed: bool,
}

impl Context {
    /// Create a context with input and output buffers of `buffer_size`
    /// bytes each. The size must be at least [`crate::codec::MAX_MESSAGE_LEN`]
    /// so any legal message can be staged for writing; config loading
    /// enforces that.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            input: ByteBuffer::with_capacity(buffer_size),
            output: ByteBuffer::with_capacity(buffer_size),
            queue: VecDeque::new(),
            decoder: MessageDecoder::new(),
            closed: false,
        }
    }

    /// Read from the socket into the input buffer and decode as many
    /// complete messages as the bytes allow, handing each to `sink`.
    ///
    /// A single event can complete zero, one, or many messages. EOF is
    /// not an error: the peer half-closed, so the context is marked
    /// closed but everything already buffered is still decoded. A
    /// malformed frame returns `InvalidData` and the caller must close
    /// the connection.
    pub fn on_readable<R, F>(&mut self, stream: &mut R, sink: &mut F) -> io::Result<()>
    where
        R: Read,
        F: FnMut(Message),
    {
        loop {
            let mut would_block = false;
            while self.input.has_room() {
                match stream.read(self.input.unfilled_mut()) {
                    Ok(0) => {
                        self.closed = true;
                        break;
                    }
                    Ok(n) => self.input.advance(n),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        would_block = true;
                        break;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            self.process_in(sink)?;
            if self.closed || would_block {
                return Ok(());
            }
            // With edge-triggered readiness we must drain the socket:
            // the read stopped because the buffer was full, so if the
            // decode above freed room we go around again. A buffer the
            // decoder could not shrink means no progress is possible.
            if !self.input.has_room() {
                return Ok(());
            }
        }
    }

    fn process_in<F: FnMut(Message)>(&mut self, sink: &mut F) -> io::Result<()> {
        loop {
            match self.decoder.process(&mut self.input) {
                DecodeStatus::Done => {
                    if let Some(msg) = self.decoder.take() {
                        sink(msg);
                    }
                    self.decoder.reset();
                }
                DecodeStatus::Refill => return Ok(()),
                DecodeStatus::Error => {
                    self.closed = true;
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "malformed frame",
                    ));
                }
            }
        }
    }

    /// Append a message to the outbound queue and immediately try to
    /// stage it into the output buffer.
    ///
    /// Draining eagerly keeps latency low when the buffer has room and
    /// naturally throttles when it does not; the caller recomputes
    /// interest afterwards.
    pub fn queue_message(&mut self, msg: Message) {
        self.queue.push_back(msg);
        self.try_send();
    }

    /// Move queued messages into the output buffer for as long as they
    /// fit. Frames are staged whole or not at all; the first message
    /// that does not fit stays queued.
    pub fn try_send(&mut self) {
        while let Some(msg) = self.queue.front() {
            if !encode_message(msg, &mut self.output) {
                break;
            }
            self.queue.pop_front();
        }
    }

    /// Write as much of the output buffer as the socket accepts, then
    /// pull more queued messages into the freed space.
    pub fn on_writable<W: Write>(&mut self, stream: &mut W) -> io::Result<()> {
        while !self.output.is_empty() {
            match stream.write(self.output.filled()) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"))
                }
                Ok(n) => self.output.consume(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.try_send();
        Ok(())
    }

    /// The readiness this context should wait for next, as a pure
    /// function of its state.
    ///
    /// READ while the connection is open and the input buffer has room;
    /// WRITE while the output buffer holds unwritten bytes. `None`
    /// means there is nothing left to do and the connection should be
    /// closed.
    pub fn interest(&self) -> Option<Interest> {
        let mut interest = None;
        if !self.closed && self.input.has_room() {
            interest = Some(Interest::READABLE);
        }
        if !self.output.is_empty() {
            interest = Some(match interest {
                Some(i) => i | Interest::WRITABLE,
                None => Interest::WRITABLE,
            });
        }
        interest
    }

    /// True once the peer half-closed or a decode error was recorded.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Messages still waiting in the outbound queue (not yet staged).
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Bytes staged in the output buffer but not yet written.
    pub fn pending_out(&self) -> usize {
        self.output.len()
    }
}
