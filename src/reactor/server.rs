//! Chat server: a single-threaded reactor fanning every decoded message
//! out to every connected client.
//!
//! Readiness-based model: poll tells us when sockets are ready, then we
//! perform non-blocking read/write syscalls. One thread owns the
//! listener, the registration table, and every connection context, so
//! no connection state is ever shared across threads.

use std::io;
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use tracing::{debug, info, warn};

use crate::codec::Message;
use crate::config::Config;
use crate::reactor::Context;

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// One entry of the registration table: the socket and its context.
///
/// The table maps a mio token directly to typed state, so event
/// dispatch never needs to downcast an opaque attachment.
struct Registration {
    stream: TcpStream,
    ctx: Context,
}

/// Run the chat server until the process is terminated.
pub fn run(config: &Config, listen: &str) -> io::Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(config.event_batch);

    let listener = create_listener(addr)?;
    let mut listener = TcpListener::from_std(listener);
    poll.registry()
        .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

    let mut connections: Slab<Registration> = Slab::with_capacity(config.max_connections);

    info!(
        %addr,
        max_connections = config.max_connections,
        buffer_size = config.buffer_size,
        "Chat server listening"
    );

    loop {
        poll.poll(&mut events, None)?;

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    accept_connections(&listener, &poll, &mut connections, config)?;
                }
                Token(conn_id) => {
                    if let Err(e) =
                        handle_connection_event(conn_id, event, &poll, &mut connections)
                    {
                        debug!(conn_id, error = %e, "Connection error");
                        close_connection(&poll, &mut connections, conn_id);
                    }
                }
            }
        }
    }
}

/// Accept every pending connection; `WouldBlock` ends the drain.
///
/// Transient accept failures are logged and skipped so one bad handshake
/// never takes the listener down.
fn accept_connections(
    listener: &TcpListener,
    poll: &Poll,
    connections: &mut Slab<Registration>,
    config: &Config,
) -> io::Result<()> {
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if connections.len() >= config.max_connections {
                    warn!(%peer_addr, "Connection limit reached, rejecting");
                    continue;
                }

                let ctx = Context::new(config.buffer_size);
                // A fresh context always wants READ, never WRITE
                let interest = match ctx.interest() {
                    Some(interest) => interest,
                    None => continue,
                };

                let conn_id = connections.insert(Registration { stream, ctx });
                let reg = &mut connections[conn_id];
                if let Err(e) = poll
                    .registry()
                    .register(&mut reg.stream, Token(conn_id), interest)
                {
                    // Registration failed for this socket only; drop it
                    // and keep the listener draining
                    warn!(conn_id, %peer_addr, error = %e, "Failed to register connection");
                    connections.remove(conn_id);
                    continue;
                }

                debug!(conn_id, peer = %peer_addr, "Accepted connection");
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::Interrupted
                ) =>
            {
                warn!(error = %e, "Transient accept error");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Dispatch one readiness event to the owning context.
///
/// Write before read: outbound backlog drains before more inbound load
/// is accepted. Messages completed by the read are fanned out to every
/// registered connection before the origin's own error, if any, closes
/// it.
fn handle_connection_event(
    conn_id: usize,
    event: &mio::event::Event,
    poll: &Poll,
    connections: &mut Slab<Registration>,
) -> io::Result<()> {
    if !connections.contains(conn_id) {
        return Ok(());
    }

    if event.is_writable() {
        let reg = &mut connections[conn_id];
        reg.ctx.on_writable(&mut reg.stream)?;
    }

    if event.is_readable() {
        let mut inbox = Vec::new();
        let read_result = {
            let reg = &mut connections[conn_id];
            reg.ctx
                .on_readable(&mut reg.stream, &mut |msg| inbox.push(msg))
        };
        if !inbox.is_empty() {
            broadcast(poll, connections, &inbox);
        }
        // Messages decoded before a malformed frame still went out
        read_result?;
    }

    update_interest(poll, connections, conn_id)
}

/// Queue each decoded message on every registered connection, in decode
/// order, origin included, then refresh everyone's interest.
fn broadcast(poll: &Poll, connections: &mut Slab<Registration>, inbox: &[Message]) {
    for msg in inbox {
        debug!(login = %msg.login, len = msg.text.len(), "Broadcasting message");
    }

    let ids: Vec<usize> = connections.iter().map(|(id, _)| id).collect();
    for id in ids {
        if let Some(reg) = connections.get_mut(id) {
            fan_out(&mut reg.ctx, inbox);
        }
        if let Err(e) = update_interest(poll, connections, id) {
            debug!(conn_id = id, error = %e, "Connection error during broadcast");
            close_connection(poll, connections, id);
        }
    }
}

/// Append every message of `inbox` to one context's outbound queue.
fn fan_out(ctx: &mut Context, inbox: &[Message]) {
    for msg in inbox {
        ctx.queue_message(msg.clone());
    }
}

/// Re-register the connection for the interest its context reports, or
/// close it when the context has nothing left to do.
fn update_interest(
    poll: &Poll,
    connections: &mut Slab<Registration>,
    conn_id: usize,
) -> io::Result<()> {
    let Some(reg) = connections.get_mut(conn_id) else {
        return Ok(());
    };
    match reg.ctx.interest() {
        Some(interest) => poll
            .registry()
            .reregister(&mut reg.stream, Token(conn_id), interest),
        None => {
            close_connection(poll, connections, conn_id);
            Ok(())
        }
    }
}

fn close_connection(poll: &Poll, connections: &mut Slab<Registration>, conn_id: usize) {
    if let Some(mut reg) = connections.try_remove(conn_id) {
        let _ = poll.registry().deregister(&mut reg.stream);
        debug!(
            conn_id,
            undelivered = reg.ctx.queued(),
            "Connection closed"
        );
    }
}

/// Build the listening socket before handing it to mio: reuse-addr for
/// quick restarts, non-blocking for the accept drain loop.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}
