//! Network transports driving the JSON-RPC handler.
//!
//! - `tcp`: single-threaded mio reactor multiplexing many client sockets
//! - `udp`: connectionless server and client, one message per datagram
//! - `client`: blocking TCP client
//!
//! All of them share the same path for a received message:
//!
//! ```text
//! bytes ─► framing decode ─► Handler::process_bytes ─► serialize ─► framing encode ─► bytes
//! ```

mod client;
mod connection;
mod framing;
mod tcp;
mod udp;

pub use client::TcpClient;
pub use framing::Framing;
pub use tcp::{PollSummary, TcpOptions, TcpServer};
pub use udp::{UdpClient, UdpServer};

use crate::netstring::FramingError;
use crate::rpc::Handler;
use bytes::Bytes;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use thiserror::Error;
use tracing::trace;

/// Errors surfaced by the transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("server is not listening")]
    NotListening,
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },
    #[error("response is not valid UTF-8")]
    InvalidUtf8,
}

impl TransportError {
    /// True for I/O errors that only mean "nothing happened in time".
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransportError::Io(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Resolve `host:port` to the first matching socket address.
pub fn resolve(addr: &str) -> Result<SocketAddr, TransportError> {
    addr.to_socket_addrs()
        .map_err(|_| TransportError::InvalidAddress(addr.to_string()))?
        .next()
        .ok_or_else(|| TransportError::InvalidAddress(addr.to_string()))
}

/// Run one unframed message through the handler and frame the response.
///
/// Returns `None` when nothing should be sent back.
pub(crate) fn respond(handler: &Handler, framing: Framing, payload: &[u8]) -> Option<Bytes> {
    let reply = handler.process_bytes(payload);
    if reply.is_empty() {
        trace!("No response for notification");
        return None;
    }
    let text = Handler::to_text(&reply.into_body());
    Some(framing.encode(text.as_bytes()))
}
