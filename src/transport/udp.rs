//! UDP transport.
//!
//! Connectionless: every datagram is one complete message, so there is no
//! per-peer state and no reassembly. Responses go back to the address the
//! request came from.

use super::framing::Framing;
use super::{respond, TransportError};
use crate::rpc::Handler;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Largest payload a UDP datagram can carry.
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Blocking JSON-RPC server over UDP.
pub struct UdpServer {
    socket: UdpSocket,
    handler: Handler,
    framing: Framing,
    buf: Vec<u8>,
}

impl UdpServer {
    /// Bind a UDP socket to `addr`. Port 0 picks an ephemeral port.
    pub fn bind(addr: SocketAddr, handler: Handler, framing: Framing) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        let socket: UdpSocket = socket.into();

        info!(addr = %socket.local_addr()?, framing = ?framing, "UDP server bound");

        Ok(Self {
            socket,
            handler,
            framing,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    /// Bound on how long [`UdpServer::recv`] waits; `None` waits forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.socket.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Wait for one datagram, process it, and answer the sender.
    ///
    /// Returns the sender's address. Framing errors drop the datagram and
    /// are returned so the caller can log them.
    pub fn recv(&mut self) -> Result<SocketAddr, TransportError> {
        let (n, peer) = self.socket.recv_from(&mut self.buf)?;
        trace!(peer = %peer, bytes = n, "Received datagram");

        let payload = self.framing.decode(&self.buf[..n])?;

        if let Some(response) = respond(&self.handler, self.framing, payload) {
            let sent = self.socket.send_to(&response, peer)?;
            if sent < response.len() {
                warn!(peer = %peer, sent, expected = response.len(), "Short datagram write");
            }
        }
        Ok(peer)
    }

    /// Serve datagrams forever. Per-datagram failures are logged.
    pub fn run(&mut self) -> Result<(), TransportError> {
        loop {
            match self.recv() {
                Ok(_) => {}
                Err(e) if e.is_timeout() => {}
                Err(TransportError::Framing(e)) => {
                    warn!(error = %e, "Dropping malformed datagram");
                }
                Err(e) => {
                    debug!(error = %e, "Datagram handling failed");
                }
            }
        }
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Mutable access to the handler, for registering methods after bind.
    pub fn handler_mut(&mut self) -> &mut Handler {
        &mut self.handler
    }
}

/// Blocking JSON-RPC client over UDP.
pub struct UdpClient {
    socket: UdpSocket,
    framing: Framing,
    buf: Vec<u8>,
}

impl UdpClient {
    /// Bind an ephemeral local port and fix `addr` as the peer.
    pub fn connect(addr: SocketAddr, framing: Framing) -> Result<Self, TransportError> {
        let local: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;

        Ok(Self {
            socket,
            framing,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    /// Bound on how long [`UdpClient::recv`] waits; `None` waits forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.socket.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send one message as a single datagram.
    pub fn send(&self, text: &str) -> Result<usize, TransportError> {
        let datagram = self.framing.encode(text.as_bytes());
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::MessageTooLarge {
                size: datagram.len(),
                limit: MAX_DATAGRAM_SIZE,
            });
        }
        Ok(self.socket.send(&datagram)?)
    }

    /// Wait for one response datagram.
    pub fn recv(&mut self) -> Result<String, TransportError> {
        let n = self.socket.recv(&mut self.buf)?;
        let payload = self.framing.decode(&self.buf[..n])?;
        String::from_utf8(payload.to_vec()).map_err(|_| TransportError::InvalidUtf8)
    }

    /// Send a request and wait for its response.
    pub fn call(&mut self, text: &str) -> Result<String, TransportError> {
        self.send(text)?;
        self.recv()
    }

    /// Local address of the ephemeral client socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
