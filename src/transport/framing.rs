//! Message boundaries on the wire.
//!
//! Stream transports need to know where one JSON-RPC message ends and the
//! next begins. Two modes are supported:
//!
//! - `Netstring`: every message is wrapped as `<len>:<json>,`.
//! - `None`: raw JSON texts back to back; boundaries are found by scanning
//!   for the end of each JSON value.
//!
//! Datagram transports get boundaries for free, but may still use netstring
//! framing for symmetry with stream deployments.

use crate::netstring::{self, Decoded, FramingError};
use bytes::{Bytes, BytesMut};
use clap::ValueEnum;
use serde::de::IgnoredAny;
use serde::Deserialize;

/// How messages are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Raw JSON text.
    #[default]
    None,
    /// Netstring-wrapped JSON text.
    Netstring,
}

/// Outcome of scanning a raw JSON stream for its first value.
enum Scan {
    Complete(usize),
    Incomplete,
    Malformed,
    Empty,
}

impl Framing {
    /// Wrap an outgoing message.
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        match self {
            Framing::None => Bytes::copy_from_slice(payload),
            Framing::Netstring => netstring::encode(payload).freeze(),
        }
    }

    /// Unwrap a message that arrived as one complete unit (a datagram).
    pub fn decode<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], FramingError> {
        match self {
            Framing::None => Ok(data),
            Framing::Netstring => netstring::decode(data),
        }
    }

    /// Take the next complete message off the front of a stream buffer.
    ///
    /// Returns `Ok(None)` when the buffer holds no complete message yet.
    ///
    /// In raw mode there is no way to resynchronize inside a broken JSON
    /// text, so once the leading bytes can never become valid JSON the whole
    /// buffer is returned as one message and the handler answers it with a
    /// single parse error. Requests already buffered behind the malformed
    /// text are consumed with it and get no reply of their own. Framing
    /// picks up again with the next read.
    pub fn next_message(&self, inbox: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        match self {
            Framing::Netstring => {
                let (start, consumed) = match netstring::decode_prefix(inbox)? {
                    Decoded::Complete { payload, consumed } => {
                        (consumed - 1 - payload.len(), consumed)
                    }
                    Decoded::Incomplete => return Ok(None),
                };
                let frame = inbox.split_to(consumed).freeze();
                Ok(Some(frame.slice(start..consumed - 1)))
            }
            Framing::None => match scan_json(inbox) {
                Scan::Complete(end) => Ok(Some(inbox.split_to(end).freeze())),
                Scan::Malformed => Ok(Some(inbox.split().freeze())),
                Scan::Incomplete => Ok(None),
                Scan::Empty => {
                    inbox.clear();
                    Ok(None)
                }
            },
        }
    }
}

fn scan_json(input: &[u8]) -> Scan {
    let mut stream = serde_json::Deserializer::from_slice(input).into_iter::<IgnoredAny>();
    match stream.next() {
        Some(Ok(_)) => Scan::Complete(stream.byte_offset()),
        Some(Err(e)) if e.is_eof() => Scan::Incomplete,
        Some(Err(_)) => Scan::Malformed,
        None => Scan::Empty,
    }
}
