//! Blocking TCP client.

use super::framing::Framing;
use super::TransportError;
use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

const READ_CHUNK: usize = 4096;

/// Blocking JSON-RPC client speaking to a [`super::TcpServer`].
pub struct TcpClient {
    stream: TcpStream,
    framing: Framing,
    inbox: BytesMut,
}

impl TcpClient {
    /// Connect to `addr` with Nagle's algorithm disabled.
    pub fn connect(addr: SocketAddr, framing: Framing) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            framing,
            inbox: BytesMut::new(),
        })
    }

    /// Bound on how long [`TcpClient::recv`] waits; `None` waits forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send one message.
    pub fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let message = self.framing.encode(text.as_bytes());
        self.stream.write_all(&message)?;
        Ok(())
    }

    /// Read exactly one response message.
    pub fn recv(&mut self) -> Result<String, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(message) = self.framing.next_message(&mut self.inbox)? {
                return String::from_utf8(message.to_vec()).map_err(|_| TransportError::InvalidUtf8);
            }

            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            self.inbox.extend_from_slice(&chunk[..n]);
        }
    }

    /// Send a request and wait for its response.
    pub fn call(&mut self, text: &str) -> Result<String, TransportError> {
        self.send(text)?;
        self.recv()
    }

    /// Local address of the client socket.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.stream.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_recv_reassembles_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"7:{\"a\":").unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
            stream.write_all(b"1},2:[],").unwrap();
        });

        let mut client = TcpClient::connect(addr, Framing::Netstring).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(client.recv().unwrap(), r#"{"a":1}"#);
        assert_eq!(client.recv().unwrap(), "[]");
        peer.join().unwrap();

        assert!(matches!(client.recv(), Err(TransportError::Io(_))));
    }

    #[test]
    fn test_send_frames_message() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpClient::connect(addr, Framing::Netstring).unwrap();
        let (mut stream, _) = listener.accept().unwrap();
        client.send("{}").unwrap();

        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"2:{},");
    }
}
