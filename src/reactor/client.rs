//! Chat client: one reactor-driven socket plus a console thread.
//!
//! The reactor thread owns the socket and its context outright. The
//! console thread never touches them: each completed line of input
//! becomes a [`Message`] sent through an mpsc channel, followed by a
//! [`Waker`] wake so the blocked poll call picks it up promptly. The
//! channel send happens-before the wake is observed, so every message
//! queued before a given poll return is visible when that return drains
//! the channel.

use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info, warn};

use crate::codec::{Message, MAX_FRAME_LEN};
use crate::config::Config;
use crate::reactor::Context;

const SOCKET_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

/// Run the chat client until the server closes the connection or the
/// socket fails.
pub fn run(config: &Config, login: &str, addr: &str) -> io::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(config.event_batch);
    let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

    let mut stream = TcpStream::connect(addr)?;
    // WRITABLE readiness signals the completed (or failed) connect
    poll.registry()
        .register(&mut stream, SOCKET_TOKEN, Interest::WRITABLE)?;

    let (sender, receiver) = std::sync::mpsc::channel::<Message>();
    spawn_console(login.to_string(), sender, Arc::clone(&waker));

    let mut ctx = Context::new(config.buffer_size);
    let mut connected = false;

    info!(%addr, login, "Connecting");

    loop {
        poll.poll(&mut events, None)?;

        for event in events.iter() {
            match event.token() {
                SOCKET_TOKEN => {
                    if !connected && event.is_writable() {
                        if !finish_connect(&stream)? {
                            // The poll gave a bad hint; keep waiting
                            continue;
                        }
                        connected = true;
                        info!(peer = %addr, "Connected");
                    }
                    if event.is_writable() {
                        ctx.on_writable(&mut stream)?;
                    }
                    if event.is_readable() {
                        ctx.on_readable(&mut stream, &mut print_message)?;
                    }
                }
                WAKER_TOKEN => {
                    // Nothing to do here; the channel is drained below
                }
                Token(token) => debug!(token, "Ignoring event for unknown token"),
            }
        }

        drain_commands(&receiver, &mut ctx);

        if connected {
            match ctx.interest() {
                Some(interest) => {
                    poll.registry()
                        .reregister(&mut stream, SOCKET_TOKEN, interest)?;
                }
                None => {
                    info!("Connection closed");
                    poll.registry().deregister(&mut stream)?;
                    return Ok(());
                }
            }
        }
    }
}

/// Confirm a pending non-blocking connect after a writable event.
///
/// Returns `Ok(false)` for a spurious wakeup while the handshake is
/// still in flight.
fn finish_connect(stream: &TcpStream) -> io::Result<bool> {
    if let Some(err) = stream.take_error()? {
        return Err(err);
    }
    match stream.peer_addr() {
        Ok(_) => Ok(true),
        Err(ref e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
        Err(e) => Err(e),
    }
}

/// Hand every message the console produced since the last poll return
/// to the context's outbound queue.
fn drain_commands(commands: &Receiver<Message>, ctx: &mut Context) {
    while let Ok(msg) = commands.try_recv() {
        ctx.queue_message(msg);
    }
}

/// Turn a console line into a message, dropping lines too long to fit
/// one text frame. An over-long line would either never stage into the
/// output buffer or get the connection dropped by the server.
fn console_message(login: &str, line: String) -> Option<Message> {
    if line.len() > MAX_FRAME_LEN {
        warn!(
            len = line.len(),
            max = MAX_FRAME_LEN,
            "Dropping over-long console line"
        );
        return None;
    }
    Some(Message::new(login, line))
}

fn print_message(msg: Message) {
    println!("{} : {}", msg.login, msg.text);
}

/// Start the console thread: read stdin line by line, send each line as
/// a message, and wake the reactor so it is delivered without waiting
/// for unrelated socket activity. The thread performs no socket I/O.
fn spawn_console(login: String, commands: Sender<Message>, waker: Arc<Waker>) {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Console read failed");
                        break;
                    }
                };
                let msg = match console_message(&login, line) {
                    Some(msg) => msg,
                    None => continue,
                };
                if commands.send(msg).is_err() {
                    break;
                }
                if let Err(e) = waker.wake() {
                    warn!(error = %e, "Failed to wake reactor");
                    break;
                }
            }
            info!("Console input closed");
        })
        .expect("failed to spawn console thread");
}
