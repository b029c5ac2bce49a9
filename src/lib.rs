//! ctrl-httpd: a minimal embedded HTTP listener
//!
//! Serves a small request/response API from a resource-constrained control
//! system without a full HTTP stack:
//! - A dedicated accept thread pulls connections from an `Acceptor`
//! - A grow-only pool of persistent worker threads processes them, one
//!   connection per worker at a time
//! - The request `Handler` can be swapped at runtime without disturbing
//!   requests already in flight
//! - `Server::stop` closes in-flight connections and joins every thread
//!
//! The `http` module holds an example HTTP/1.0 handler (`GridApi`).

pub mod acceptor;
pub mod config;
pub mod handler;
pub mod http;
pub mod pool;
pub mod server;
pub mod stream;
#[cfg(unix)]
pub mod tcp;

#[cfg(test)]
pub(crate) mod testing;

pub use acceptor::Acceptor;
pub use handler::{Handler, HandlerError, HandlerSlot};
pub use http::GridApi;
pub use pool::PoolStats;
pub use server::{Server, ServerOptions};
pub use stream::{ShutdownHandle, Stream};
#[cfg(unix)]
pub use tcp::TcpAcceptor;
