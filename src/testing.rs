//! Test doubles for driving the server without a real listener.

use crate::acceptor::{shut_down_error, Acceptor};
use crate::stream::Stream;
use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A connected loopback pair: (server side, client side).
pub(crate) fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server_side, _) = listener.accept().unwrap();
    (server_side, client)
}

/// Poll `condition` until it holds or the deadline passes.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

type Incoming = Option<Box<dyn Stream>>;

/// Acceptor fed from a channel instead of a socket.
pub(crate) struct ChannelAcceptor {
    incoming: Mutex<Receiver<Incoming>>,
    wake: Mutex<Sender<Incoming>>,
    fail_start: bool,
    shutdown: Arc<AtomicBool>,
    accept_calls: Arc<AtomicUsize>,
}

/// Test-side end of a `ChannelAcceptor`.
#[derive(Clone)]
pub(crate) struct Connector {
    sender: Sender<Incoming>,
    failed: Arc<AtomicBool>,
    accept_calls: Arc<AtomicUsize>,
}

impl ChannelAcceptor {
    pub(crate) fn new() -> (Self, Connector) {
        Self::build(false)
    }

    /// An acceptor whose `start` always fails, as if the port were taken.
    pub(crate) fn failing() -> (Self, Connector) {
        Self::build(true)
    }

    fn build(fail_start: bool) -> (Self, Connector) {
        let (sender, receiver) = mpsc::channel();
        let accept_calls = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));
        let acceptor = Self {
            incoming: Mutex::new(receiver),
            wake: Mutex::new(sender.clone()),
            fail_start,
            shutdown: Arc::clone(&shutdown),
            accept_calls: Arc::clone(&accept_calls),
        };
        (
            acceptor,
            Connector {
                sender,
                failed: shutdown,
                accept_calls,
            },
        )
    }
}

impl Acceptor for ChannelAcceptor {
    fn start(&self) -> io::Result<()> {
        if self.fail_start {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use"));
        }
        Ok(())
    }

    fn accept(&self) -> io::Result<Box<dyn Stream>> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        let incoming = self.incoming.lock().unwrap();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(shut_down_error());
            }
            match incoming.recv() {
                Ok(Some(stream)) => return Ok(stream),
                Ok(None) => continue,
                Err(_) => return Err(shut_down_error()),
            }
        }
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.wake.lock().unwrap().send(None);
    }
}

impl Connector {
    /// Open a connection through the acceptor and return the client side.
    pub(crate) fn connect(&self) -> TcpStream {
        let (server_side, client) = tcp_pair();
        let stream: Box<dyn Stream> = Box::new(server_side);
        self.sender.send(Some(stream)).unwrap();
        client
    }

    /// Make the pending and every later `accept` fail.
    pub(crate) fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
        let _ = self.sender.send(None);
    }

    /// Number of times the server has called `accept`.
    pub(crate) fn accept_calls(&self) -> usize {
        self.accept_calls.load(Ordering::SeqCst)
    }
}
