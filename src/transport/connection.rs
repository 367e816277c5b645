//! Connection state for the TCP reactor.
//!
//! Each connection owns its socket plus an inbox (bytes received but not
//! yet forming a complete message) and an outbox (response bytes the
//! kernel has not accepted yet).

use bytes::BytesMut;
use mio::net::TcpStream;
use slab::Slab;
use std::net::SocketAddr;

/// Lifecycle of a tracked client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Serviced on readiness.
    Active,
    /// Peer closed or errored; removed at the end of the poll iteration.
    PendingPurge,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub inbox: BytesMut,
    pub outbox: BytesMut,
    pub state: ConnState,
    /// Registered for writable readiness because the outbox is not empty.
    pub write_interest: bool,
    /// Reads stopped because the outbox reached its limit.
    pub read_paused: bool,
}

impl Connection {
    /// Create a new active connection with empty buffers.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            inbox: BytesMut::new(),
            outbox: BytesMut::new(),
            state: ConnState::Active,
            write_interest: false,
            read_paused: false,
        }
    }

    /// Check if the connection is still being serviced.
    pub fn is_active(&self) -> bool {
        self.state == ConnState::Active
    }
}

/// Registry of tracked connections using slab allocation.
///
/// Ids are slab keys; iteration is in key order, which matches insertion
/// order until a purged slot is reused.
pub struct ConnectionRegistry {
    connections: Slab<Connection>,
    purge: Vec<usize>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections.min(1024)),
            purge: Vec::new(),
            max_connections,
        }
    }

    /// Insert a new connection.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    /// Get an immutable reference to a connection.
    pub fn get(&self, id: usize) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Get a mutable reference to a connection.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    /// Check if a connection exists.
    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    /// Mark a connection for removal at the next purge pass.
    ///
    /// Marking is idempotent, so a connection is only ever purged once.
    pub fn schedule_purge(&mut self, id: usize) {
        if let Some(conn) = self.connections.get_mut(id) {
            if conn.is_active() {
                conn.state = ConnState::PendingPurge;
                self.purge.push(id);
            }
        }
    }

    /// Ids currently awaiting purge.
    pub fn pending_purge(&self) -> &[usize] {
        &self.purge
    }

    /// Remove every connection marked for purge and hand them back to the
    /// caller, which closes them by dropping.
    pub fn take_purged(&mut self) -> Vec<(usize, Connection)> {
        let ids = std::mem::take(&mut self.purge);
        ids.into_iter()
            .filter_map(|id| self.connections.try_remove(id).map(|conn| (id, conn)))
            .collect()
    }

    /// Remove every connection.
    pub fn drain(&mut self) -> Vec<(usize, Connection)> {
        self.purge.clear();
        self.ids()
            .into_iter()
            .filter_map(|id| self.connections.try_remove(id).map(|conn| (id, conn)))
            .collect()
    }

    /// Ids of all tracked connections, in slab order.
    pub fn ids(&self) -> Vec<usize> {
        self.connections.iter().map(|(id, _)| id).collect()
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Check if another connection would exceed the limit.
    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }
}
