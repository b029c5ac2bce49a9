//! TCP acceptor backed by mio.
//!
//! The listening socket is a non-blocking `mio` listener registered with a `Poll`
//! alongside a `Waker`. `accept` parks in `poll` until a client arrives;
//! `shutdown` flips a flag and fires the waker, so a blocked accept thread
//! returns promptly without relying on closing the listener underneath it.

use crate::acceptor::{shut_down_error, Acceptor};
use crate::stream::Stream;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, info, warn};

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Accepts TCP connections on a configured address and port.
pub struct TcpAcceptor {
    listen_address: String,
    port: u16,
    shutdown: AtomicBool,
    waker: OnceLock<Waker>,
    local_addr: OnceLock<SocketAddr>,
    listening: Mutex<Option<Listening>>,
}

/// State that only exists between `start` and shutdown.
struct Listening {
    listener: TcpListener,
    poll: Poll,
    events: Events,
}

impl TcpAcceptor {
    /// Create an acceptor for `listen_address:port`.
    ///
    /// An empty address listens on all interfaces. Nothing is bound until
    /// `start` is called.
    pub fn new(listen_address: impl Into<String>, port: u16) -> Self {
        Self {
            listen_address: listen_address.into(),
            port,
            shutdown: AtomicBool::new(false),
            waker: OnceLock::new(),
            local_addr: OnceLock::new(),
            listening: Mutex::new(None),
        }
    }

    fn listening(&self) -> MutexGuard<'_, Option<Listening>> {
        self.listening.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Acceptor for TcpAcceptor {
    fn start(&self) -> io::Result<()> {
        let mut listening = self.listening();
        if listening.is_some() {
            return Ok(());
        }

        let addr = resolve(&self.listen_address, self.port)?;
        let mut listener = TcpListener::from_std(create_listener(addr)?);
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;

        let local = listener.local_addr()?;
        let _ = self.local_addr.set(local);
        let _ = self.waker.set(waker);
        info!(addr = %local, "Listening");

        *listening = Some(Listening {
            listener,
            poll,
            events: Events::with_capacity(8),
        });
        Ok(())
    }

    fn accept(&self) -> io::Result<Box<dyn Stream>> {
        let mut guard = self.listening();

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                // Release the port right away
                guard.take();
                return Err(shut_down_error());
            }

            let listening = guard
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "not listening"))?;

            match listening.listener.accept() {
                Ok((stream, peer)) => {
                    // Workers use blocking reads and writes
                    let stream = TcpStream::from(OwnedFd::from(stream));
                    if let Err(e) = stream.set_nonblocking(false) {
                        warn!(peer = %peer, error = %e, "Dropping connection");
                        continue;
                    }
                    return Ok(Box::new(stream));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(ref e)
                    if e.kind() == io::ErrorKind::Interrupted
                        || e.kind() == io::ErrorKind::ConnectionAborted =>
                {
                    debug!(error = %e, "Retrying accept");
                    continue;
                }
                Err(e) => return Err(e),
            }

            match listening.poll.poll(&mut listening.events, None) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(waker) = self.waker.get() {
            if let Err(e) = waker.wake() {
                warn!(error = %e, "Failed to wake accept loop");
            }
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}

/// Resolve the configured address; empty means all interfaces.
fn resolve(listen_address: &str, port: u16) -> io::Result<SocketAddr> {
    let host = if listen_address.is_empty() {
        "0.0.0.0"
    } else {
        listen_address
    };

    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no address for {}:{}", host, port),
        )
    })
}

fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
