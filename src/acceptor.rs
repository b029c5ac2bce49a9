//! Source of incoming connections.

use crate::stream::Stream;
use std::io;
use std::net::SocketAddr;

/// Produces a new `Stream` per incoming connection.
///
/// The server calls `start` once, then `accept` repeatedly from its accept
/// thread. `shutdown` may be called from any other thread and must make a
/// pending or later `accept` return an error. Any error from `accept` ends the
/// accept loop; there is no distinction between a shutdown and a fatal failure.
pub trait Acceptor: Send + Sync + 'static {
    /// Bind and start listening.
    fn start(&self) -> io::Result<()>;

    /// Block until the next connection arrives.
    fn accept(&self) -> io::Result<Box<dyn Stream>>;

    /// Stop accepting and wake any blocked `accept`.
    fn shutdown(&self);

    /// Address actually bound, once started.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Error returned by `accept` after `shutdown`.
pub(crate) fn shut_down_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "acceptor shut down")
}
