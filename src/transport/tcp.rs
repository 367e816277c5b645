//! Single-threaded TCP reactor.
//!
//! Readiness-based model: one `mio::Poll` covers the listening socket and
//! every client socket. Each call to [`TcpServer::wait_message`] is one
//! iteration:
//!
//! 1. poll with the caller's timeout
//! 2. accept pending clients if the listener is ready
//! 3. service ready clients in id order: drain the socket, dispatch every
//!    complete message, write responses
//! 4. purge clients whose peer closed or whose read failed
//!
//! All handler invocations happen on the thread driving the loop, so a
//! connection never has two requests in flight at once.
//!
//! ## Reassembly
//!
//! mio readiness is edge-triggered, so a ready socket is read until it
//! would block. Bytes accumulate in the connection inbox until they form a
//! complete message (a netstring frame, or a JSON text in raw mode). The
//! inbox is bounded by `max_message_size`.
//!
//! ## Writes
//!
//! Responses are appended to the connection outbox and written
//! immediately. Whatever the kernel does not take is flushed when the
//! socket reports writable, so a slow reader does not stall other clients.
//! Once the outbox holds `max_outbox_size` bytes the connection is not read
//! any further; reading resumes after the peer drains enough of it.

use super::connection::{Connection, ConnectionRegistry};
use super::framing::Framing;
use super::{respond, TransportError};
use crate::rpc::Handler;
use bytes::Buf;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Maximum readiness events handled per poll.
const EVENTS_CAPACITY: usize = 1024;

/// Tuning knobs for [`TcpServer`].
#[derive(Debug, Clone)]
pub struct TcpOptions {
    /// Message delimiting on the wire.
    pub framing: Framing,
    /// Clients beyond this count are disconnected on accept.
    pub max_connections: usize,
    /// Size of the buffer used for each read syscall.
    pub recv_buffer_size: usize,
    /// Largest incomplete message held per connection.
    pub max_message_size: usize,
    /// Unsent response bytes per connection at which reads pause.
    pub max_outbox_size: usize,
    /// Listen backlog.
    pub backlog: i32,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            framing: Framing::Netstring,
            max_connections: 1024,
            recv_buffer_size: 16 * 1024,
            max_message_size: 1024 * 1024,
            max_outbox_size: 4 * 1024 * 1024,
            backlog: 128,
        }
    }
}

/// What one poll iteration did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// Clients accepted.
    pub accepted: usize,
    /// Ready clients serviced.
    pub serviced: usize,
    /// Clients closed and removed.
    pub purged: usize,
}

impl PollSummary {
    fn add(&mut self, other: PollSummary) {
        self.accepted += other.accepted;
        self.serviced += other.serviced;
        self.purged += other.purged;
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Readiness {
    readable: bool,
    writable: bool,
}

/// JSON-RPC server multiplexing many TCP clients on one thread.
pub struct TcpServer {
    handler: Handler,
    options: TcpOptions,
    local_addr: SocketAddr,
    /// Bound socket waiting for `listen`.
    socket: Option<Socket>,
    listener: Option<TcpListener>,
    poll: Poll,
    events: Events,
    connections: ConnectionRegistry,
    read_buf: Vec<u8>,
}

impl TcpServer {
    /// Create the server socket and bind it to `addr`.
    ///
    /// Port 0 picks an ephemeral port; see [`TcpServer::local_addr`].
    pub fn bind(
        addr: SocketAddr,
        handler: Handler,
        options: TcpOptions,
    ) -> Result<Self, TransportError> {
        let socket = create_socket(addr)?;
        let local_addr = socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| TransportError::InvalidAddress(addr.to_string()))?;

        debug!(addr = %local_addr, "Bound TCP socket");

        Ok(Self {
            handler,
            local_addr,
            socket: Some(socket),
            listener: None,
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            connections: ConnectionRegistry::new(options.max_connections),
            read_buf: vec![0u8; options.recv_buffer_size.max(1)],
            options,
        })
    }

    /// Start listening. Calling it again once listening is a no-op.
    pub fn listen(&mut self) -> Result<(), TransportError> {
        if self.listener.is_some() {
            return Ok(());
        }

        let socket = self.socket.take().ok_or(TransportError::NotListening)?;
        if let Err(e) = socket.listen(self.options.backlog) {
            self.socket = Some(socket);
            return Err(e.into());
        }

        let mut listener = TcpListener::from_std(socket.into());
        self.poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        self.listener = Some(listener);

        info!(
            addr = %self.local_addr,
            framing = ?self.options.framing,
            max_connections = self.options.max_connections,
            "Listening"
        );
        Ok(())
    }

    /// Run one poll iteration.
    ///
    /// `timeout` of `None` blocks until something is ready; a zero duration
    /// returns immediately. Poll failures are logged and the iteration is
    /// skipped. The only error is calling this before [`TcpServer::listen`].
    pub fn wait_message(&mut self, timeout: Option<Duration>) -> Result<PollSummary, TransportError> {
        if self.listener.is_none() {
            return Err(TransportError::NotListening);
        }

        let mut summary = PollSummary::default();

        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() != io::ErrorKind::Interrupted {
                error!(error = %e, "Poll failed");
            }
            return Ok(summary);
        }

        let mut listener_ready = false;
        let mut ready: BTreeMap<usize, Readiness> = BTreeMap::new();

        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => listener_ready = true,
                Token(id) => {
                    let entry = ready.entry(id).or_default();
                    entry.readable |=
                        event.is_readable() || event.is_read_closed() || event.is_error();
                    entry.writable |= event.is_writable();
                }
            }
        }

        if listener_ready {
            summary.accepted = self.accept_clients();
        }

        for (id, readiness) in ready {
            if !self.connections.contains(id) {
                continue;
            }
            if readiness.readable {
                self.service_readable(id);
            } else if readiness.writable {
                self.flush(id);
                if self.connections.get(id).is_some_and(|c| c.read_paused)
                    && self.has_output_room(id)
                {
                    self.service_readable(id);
                }
            }
            summary.serviced += 1;
        }

        summary.purged = self.purge();
        Ok(summary)
    }

    /// Poll forever.
    pub fn run(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        let mut total = PollSummary::default();
        loop {
            let summary = self.wait_message(timeout)?;
            total.add(summary);
            trace!(
                accepted = total.accepted,
                serviced = total.serviced,
                purged = total.purged,
                clients = self.connections.len(),
                "Poll iteration"
            );
        }
    }

    /// Close every client connection. The listener stays open.
    pub fn close(&mut self) {
        let clients = self.connections.drain();
        let count = clients.len();
        for (_, mut conn) in clients {
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
        if count > 0 {
            info!(clients = count, "Closed all client connections");
        }
    }

    /// Ids of the tracked clients, in service order.
    pub fn clients(&self) -> Vec<usize> {
        self.connections.ids()
    }

    /// Number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.connections.len()
    }

    /// Address the server is bound to, with the ephemeral port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Options the server was bound with.
    pub fn options(&self) -> &TcpOptions {
        &self.options
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Mutable access to the handler, for registering methods after bind.
    pub fn handler_mut(&mut self) -> &mut Handler {
        &mut self.handler
    }

    fn accept_clients(&mut self) -> usize {
        let Some(listener) = self.listener.as_ref() else {
            return 0;
        };

        let mut accepted = 0;
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let Some(id) = self.connections.insert(Connection::new(stream, peer)) else {
                        warn!(peer = %peer, "Connection limit reached, rejecting client");
                        continue;
                    };

                    let Some(conn) = self.connections.get_mut(id) else {
                        continue;
                    };
                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut conn.stream, Token(id), Interest::READABLE)
                    {
                        warn!(peer = %peer, error = %e, "Failed to register client");
                        self.connections.schedule_purge(id);
                        continue;
                    }

                    debug!(conn_id = id, peer = %peer, "Accepted connection");
                    accepted += 1;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }
        accepted
    }

    /// Drain a readable client, dispatch complete messages, and write the
    /// responses. EOF or a read error schedules the client for purge.
    fn service_readable(&mut self, id: usize) {
        loop {
            let paused = self.read_available(id);
            self.flush(id);
            // Edge-triggered: a paused socket may still hold unread bytes
            if !paused || !self.has_output_room(id) {
                break;
            }
        }
    }

    /// Read until the socket would block or the outbox is full.
    ///
    /// Returns true if reading stopped because of the outbox limit.
    fn read_available(&mut self, id: usize) -> bool {
        let Self {
            handler,
            options,
            connections,
            read_buf,
            ..
        } = &mut *self;

        let Some(conn) = connections.get_mut(id) else {
            return false;
        };
        if !conn.is_active() {
            return false;
        }

        conn.read_paused = false;
        let mut closed = false;
        loop {
            if conn.outbox.len() >= options.max_outbox_size {
                trace!(conn_id = id, pending = conn.outbox.len(), "Outbox full, pausing reads");
                conn.read_paused = true;
                break;
            }

            match conn.stream.read(read_buf) {
                Ok(0) => {
                    debug!(conn_id = id, peer = %conn.peer, "Peer closed connection");
                    closed = true;
                    break;
                }
                Ok(n) => {
                    trace!(conn_id = id, bytes = n, "Read");
                    conn.inbox.extend_from_slice(&read_buf[..n]);
                    dispatch_inbox(handler, options, id, conn);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(conn_id = id, peer = %conn.peer, error = %e, "Read failed");
                    closed = true;
                    break;
                }
            }
        }

        let paused = conn.read_paused;
        if closed {
            connections.schedule_purge(id);
        }
        paused
    }

    fn has_output_room(&self, id: usize) -> bool {
        self.connections
            .get(id)
            .is_some_and(|c| c.outbox.len() < self.options.max_outbox_size)
    }

    /// Write as much of the outbox as the kernel accepts.
    ///
    /// A write error drops the pending response but keeps the connection;
    /// a broken peer is purged when its next read fails.
    fn flush(&mut self, id: usize) {
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };

        while !conn.outbox.is_empty() {
            match conn.stream.write(&conn.outbox) {
                Ok(0) => {
                    warn!(conn_id = id, peer = %conn.peer, "Write returned zero bytes");
                    conn.outbox.clear();
                }
                Ok(n) => {
                    trace!(conn_id = id, bytes = n, "Wrote");
                    conn.outbox.advance(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(conn_id = id, peer = %conn.peer, error = %e, "Error while sending data");
                    conn.outbox.clear();
                }
            }
        }

        let wants_write = !conn.outbox.is_empty();
        if wants_write != conn.write_interest {
            let interest = if wants_write {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            match self
                .poll
                .registry()
                .reregister(&mut conn.stream, Token(id), interest)
            {
                Ok(()) => conn.write_interest = wants_write,
                Err(e) => warn!(conn_id = id, error = %e, "Failed to update interest"),
            }
        }
    }

    /// Close and forget every client scheduled for purge.
    fn purge(&mut self) -> usize {
        let purged = self.connections.take_purged();
        let count = purged.len();

        for (id, mut conn) in purged {
            if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
                trace!(conn_id = id, error = %e, "Deregister failed");
            }
            debug!(conn_id = id, peer = %conn.peer, "Connection closed");
        }

        if count > 0 {
            debug!(
                purged = count,
                remaining = self.connections.len(),
                "Purged connections"
            );
        }
        count
    }
}

/// Dispatch every complete message buffered in a connection's inbox.
fn dispatch_inbox(handler: &Handler, options: &TcpOptions, id: usize, conn: &mut Connection) {
    loop {
        match options.framing.next_message(&mut conn.inbox) {
            Ok(Some(message)) => {
                if let Some(response) = respond(handler, options.framing, &message) {
                    conn.outbox.extend_from_slice(&response);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(conn_id = id, peer = %conn.peer, error = %e, "Dropping malformed frame");
                conn.inbox.clear();
                break;
            }
        }
    }

    if conn.inbox.len() > options.max_message_size {
        let e = TransportError::MessageTooLarge {
            size: conn.inbox.len(),
            limit: options.max_message_size,
        };
        warn!(conn_id = id, peer = %conn.peer, error = %e, "Discarding oversized message");
        conn.inbox.clear();
    }
}

/// Create a non-blocking TCP socket bound to `addr`.
fn create_socket(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket)
}
