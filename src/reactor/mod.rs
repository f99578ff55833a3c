//! Single-threaded non-blocking reactor.
//!
//! Both ends of the chat protocol run on the same engine: a mio `Poll`
//! blocks on readiness, and each ready registration dispatches to its
//! [`Context`], which owns the buffers, decoder, and outbound queue for
//! that socket. The server side adds accept and fan-out; the client
//! side adds a console thread bridged in through a channel and waker.

mod context;

pub mod client;
pub mod server;

pub(crate) use context::Context;
