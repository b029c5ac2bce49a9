//! The listener: an accept thread feeding a worker pool.
//!
//! Construction starts the acceptor and spawns the accept thread. Each
//! accepted connection is dispatched to the pool, where it is processed by
//! whichever handler is current when its worker picks it up. `stop` shuts the
//! acceptor down, joins the accept thread, closes in-flight connections and
//! joins every worker before returning.

use crate::acceptor::Acceptor;
use crate::handler::{Handler, HandlerSlot};
use crate::pool::{PoolStats, WorkerPool};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, info_span, warn, Span};

/// Identity and address of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Name used in logs and thread names.
    pub name: String,
    /// Address to bind; empty means all interfaces.
    pub listen_address: String,
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: "ctrl-httpd".to_string(),
            listen_address: String::new(),
            port: 1111,
        }
    }
}

/// Server instance
pub struct Server {
    shared: Arc<Shared>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

/// State shared with the accept thread.
struct Shared {
    options: ServerOptions,
    active: AtomicBool,
    acceptor: Box<dyn Acceptor>,
    handler: Arc<HandlerSlot>,
    pool: WorkerPool,
    span: Span,
}

impl Server {
    /// Start a server with no handler installed yet.
    ///
    /// If the acceptor fails to start the failure is logged and the server
    /// stays inactive; it never accepts a connection.
    pub fn new(options: ServerOptions, acceptor: Box<dyn Acceptor>) -> Self {
        Self::start(options, acceptor, None)
    }

    /// Start a server that serves connections with `handler`.
    pub fn with_handler<H: Handler>(
        options: ServerOptions,
        acceptor: Box<dyn Acceptor>,
        handler: H,
    ) -> Self {
        Self::start(options, acceptor, Some(Arc::new(handler)))
    }

    /// Start a server on a TCP listener for the options' address and port.
    #[cfg(unix)]
    pub fn bind(options: ServerOptions) -> Self {
        let acceptor = crate::tcp::TcpAcceptor::new(options.listen_address.clone(), options.port);
        Self::new(options, Box::new(acceptor))
    }

    fn start(
        options: ServerOptions,
        acceptor: Box<dyn Acceptor>,
        handler: Option<Arc<dyn Handler>>,
    ) -> Self {
        let span = info_span!("server", name = %options.name);
        let handler = Arc::new(HandlerSlot::new(handler));
        let pool = WorkerPool::new(options.name.clone(), Arc::clone(&handler));

        let shared = Arc::new(Shared {
            options,
            active: AtomicBool::new(true),
            acceptor,
            handler,
            pool,
            span,
        });

        let accept_thread = {
            let _enter = shared.span.enter();
            match shared.acceptor.start() {
                Ok(()) => {
                    let thread_shared = Arc::clone(&shared);
                    let spawned = thread::Builder::new()
                        .name(format!("{}-accept", shared.options.name))
                        .spawn(move || thread_shared.accept_loop());
                    match spawned {
                        Ok(thread) => Some(thread),
                        Err(e) => {
                            error!(error = %e, "Failed to spawn accept thread");
                            shared.acceptor.shutdown();
                            shared.active.store(false, Ordering::SeqCst);
                            None
                        }
                    }
                }
                Err(e) => {
                    error!(
                        address = %shared.options.listen_address,
                        port = shared.options.port,
                        error = %e,
                        "Failed to start listener"
                    );
                    shared.active.store(false, Ordering::SeqCst);
                    None
                }
            }
        };

        Server {
            shared,
            accept_thread: Mutex::new(accept_thread),
            stopped: AtomicBool::new(false),
        }
    }

    /// Stop accepting, close in-flight connections and wait for every thread.
    ///
    /// Calls after the first return immediately.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let _enter = self.shared.span.enter();
        self.shared.active.store(false, Ordering::SeqCst);
        self.shared.acceptor.shutdown();

        let accept_thread = self
            .accept_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = accept_thread {
            if thread.join().is_err() {
                error!("Accept thread panicked");
            }
        }

        self.shared.pool.shutdown();

        let stats = self.shared.pool.stats();
        info!(workers = stats.workers, served = stats.served, "Server stopped");
    }

    /// Replace the handler. Requests already being processed keep the
    /// handler they started with; every later request uses `handler`.
    pub fn set_handler<H: Handler>(&self, handler: H) {
        self.set_shared_handler(Arc::new(handler));
    }

    /// Like `set_handler`, for a handler that is already shared.
    pub fn set_shared_handler(&self, handler: Arc<dyn Handler>) {
        let version = self.shared.handler.store(handler);
        let _enter = self.shared.span.enter();
        debug!(version, "Handler replaced");
    }

    pub fn name(&self) -> &str {
        &self.shared.options.name
    }

    pub fn listen_address(&self) -> &str {
        &self.shared.options.listen_address
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.shared.options.port
    }

    /// Address actually bound, if the acceptor reports one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.acceptor.local_addr()
    }

    /// False once the listener failed to start, accepting failed, or `stop`
    /// was called. A server never becomes active again.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn accept_loop(&self) {
        let _enter = self.span.enter();
        debug!("Waiting for clients to connect");

        while self.active.load(Ordering::SeqCst) {
            let stream = match self.acceptor.accept() {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(error = %e, "Accept failed");
                    self.active.store(false, Ordering::SeqCst);
                    break;
                }
            };

            if !self.active.load(Ordering::SeqCst) {
                break;
            }

            match stream.peer_addr() {
                Some(peer) => debug!(peer = %peer, "Client connection"),
                None => debug!("Client connection"),
            }

            if let Err(e) = self.pool.dispatch(stream) {
                warn!(error = %e, "Failed to dispatch connection");
            }
        }

        debug!("Leaving accept loop");
    }
}
