//! Connection streams handed from the acceptor to workers.
//!
//! A `Stream` is owned by exactly one worker while it is being processed.
//! The server still needs a way to cut an in-flight connection short during
//! shutdown, so every stream can produce a `ShutdownHandle` that closes the
//! underlying socket from another thread without touching the stream itself.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// One accepted connection.
pub trait Stream: Read + Write + Send + 'static {
    /// Address of the remote peer, if known.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Create a handle that can shut this connection down from another thread.
    fn shutdown_handle(&self) -> io::Result<ShutdownHandle>;
}

/// Closes a connection that is owned by someone else.
///
/// Shutting down unblocks any read or write pending on the connection.
pub struct ShutdownHandle {
    close: Box<dyn Fn() -> io::Result<()> + Send + Sync>,
}

impl ShutdownHandle {
    pub fn new<F>(close: F) -> Self
    where
        F: Fn() -> io::Result<()> + Send + Sync + 'static,
    {
        Self {
            close: Box::new(close),
        }
    }

    /// Shut the connection down in both directions.
    pub fn shutdown(&self) -> io::Result<()> {
        (self.close)()
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle").finish_non_exhaustive()
    }
}

impl Stream for TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }

    fn shutdown_handle(&self) -> io::Result<ShutdownHandle> {
        let socket = self.try_clone()?;
        Ok(ShutdownHandle::new(move || match socket.shutdown(Shutdown::Both) {
            // Peer already went away
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tcp_pair;

    #[test]
    fn test_shutdown_handle_unblocks_read() {
        let (mut server_side, _client) = tcp_pair();
        let handle = server_side.shutdown_handle().unwrap();

        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            server_side.read(&mut buf)
        });

        handle.shutdown().unwrap();
        let result = reader.join().unwrap();
        assert!(matches!(result, Ok(0) | Err(_)));
    }

    #[test]
    fn test_peer_addr() {
        let (server_side, client) = tcp_pair();
        assert_eq!(
            Stream::peer_addr(&server_side),
            Some(client.local_addr().unwrap())
        );
    }
}
