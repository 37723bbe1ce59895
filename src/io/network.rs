// src/io/network.rs
//
// Shared write path to the network peer.
//
// Bridged serial data (reader activity) and control replies (writer activity,
// status poller) all go out through one NetworkWriter, and each send holds the
// lock for its whole buffer so messages never interleave on the wire.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};

use super::codec::ReplySink;

pub struct NetworkWriter {
    stream: Mutex<TcpStream>,
    /// Separate handle so shutdown never waits behind a send blocked on a stalled peer
    control: TcpStream,
    label: String,
}

impl NetworkWriter {
    pub fn new(stream: &TcpStream) -> io::Result<Arc<Self>> {
        let label = match stream.peer_addr() {
            Ok(addr) => peer_label(addr),
            Err(_) => "tcp(unknown)".to_string(),
        };
        Ok(Arc::new(Self {
            stream: Mutex::new(stream.try_clone()?),
            control: stream.try_clone()?,
            label,
        }))
    }

    /// Send the whole buffer while holding the write lock.
    pub fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        stream.write_all(data)?;
        stream.flush()
    }

    /// Shut the connection down in both directions.
    ///
    /// Blocked reads on any handle of this socket return, and further sends fail.
    /// Calling it again once the socket is down is not an error.
    pub fn shutdown(&self) -> io::Result<()> {
        match self.control.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl ReplySink for NetworkWriter {
    fn send(&self, data: &[u8]) -> io::Result<()> {
        NetworkWriter::send(self, data)
    }
}

pub fn peer_label(addr: SocketAddr) -> String {
    format!("tcp({})", addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        (server, client)
    }

    #[test]
    fn test_send_reaches_peer() {
        let (server, mut client) = pair();
        let writer = NetworkWriter::new(&server).expect("writer");
        writer.send(b"hello").expect("send");

        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).expect("read");
        assert_eq!(&buf, b"hello");
        assert!(writer.label().starts_with("tcp(127.0.0.1:"));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_unblocks_peer() {
        let (server, mut client) = pair();
        let writer = NetworkWriter::new(&server).expect("writer");
        writer.shutdown().expect("first shutdown");
        writer.shutdown().expect("second shutdown");

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).expect("eof"), 0);
        assert!(writer.send(b"late").is_err());
    }
}
