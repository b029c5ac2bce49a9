//! Grow-only pool of persistent worker threads.
//!
//! Each worker owns a capacity-1 channel and processes one connection at a
//! time. Dispatch scans the slots in insertion order and hands the connection
//! to the first idle worker; only when every worker is busy does the pool
//! append a new slot and spawn its thread. Workers are never retired, so the
//! pool size tracks the peak number of connections in flight.
//!
//! ## Worker states
//!
//! ```text
//! Idle --(dispatch)--> Processing --(handler returns)--> Idle
//! Idle --(channel closed)--> Stopped
//! ```
//!
//! A slot is busy while its in-flight marker holds the connection's
//! `ShutdownHandle`. The dispatcher sets the marker before sending; the worker
//! clears it after the handler returns and before the connection is closed.

use crate::handler::HandlerSlot;
use crate::stream::{ShutdownHandle, Stream};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn, Span};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Workers ever spawned.
    pub workers: usize,
    /// Workers currently holding a connection.
    pub busy: usize,
    /// Connections processed to completion.
    pub served: u64,
}

pub struct WorkerPool {
    name: String,
    handler: Arc<HandlerSlot>,
    state: Mutex<PoolState>,
}

struct PoolState {
    slots: Vec<WorkerSlot>,
    closed: bool,
}

struct WorkerSlot {
    id: usize,
    shared: Arc<WorkerShared>,
    sender: Option<SyncSender<Box<dyn Stream>>>,
    thread: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct WorkerShared {
    in_flight: Mutex<Option<ShutdownHandle>>,
    served: AtomicU64,
}

impl WorkerShared {
    fn in_flight(&self) -> MutexGuard<'_, Option<ShutdownHandle>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkerSlot {
    fn is_idle(&self) -> bool {
        self.sender.is_some() && self.shared.in_flight().is_none()
    }
}

impl WorkerPool {
    /// Create an empty pool. `name` prefixes worker thread names.
    pub fn new(name: impl Into<String>, handler: Arc<HandlerSlot>) -> Self {
        Self {
            name: name.into(),
            handler,
            state: Mutex::new(PoolState {
                slots: Vec::new(),
                closed: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a connection to the first idle worker, spawning one if needed.
    ///
    /// On error the connection has been dropped.
    pub fn dispatch(&self, stream: Box<dyn Stream>) -> io::Result<()> {
        let closer = stream.shutdown_handle()?;
        let mut state = self.state();

        if state.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "worker pool shut down"));
        }

        let index = match state.slots.iter().position(WorkerSlot::is_idle) {
            Some(index) => index,
            None => {
                let id = state.slots.len();
                let slot = self.spawn_worker(id)?;
                state.slots.push(slot);
                id
            }
        };

        let slot = &state.slots[index];
        let Some(sender) = slot.sender.as_ref() else {
            return Err(io::Error::new(io::ErrorKind::Other, "worker stopped"));
        };

        *slot.shared.in_flight() = Some(closer);
        match sender.try_send(stream) {
            Ok(()) => {
                trace!(worker = slot.id, "Connection assigned");
                Ok(())
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                slot.shared.in_flight().take();
                Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("worker {} not accepting work", slot.id),
                ))
            }
        }
    }

    fn spawn_worker(&self, id: usize) -> io::Result<WorkerSlot> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let shared = Arc::new(WorkerShared::default());
        let worker = Worker {
            id,
            shared: Arc::clone(&shared),
            handler: Arc::clone(&self.handler),
            receiver,
        };

        // Keep the caller's span (the server name) on worker events
        let span = Span::current();
        let thread = thread::Builder::new()
            .name(format!("{}-worker-{}", self.name, id))
            .spawn(move || {
                let _enter = span.enter();
                worker.run();
            })?;

        debug!(worker = id, "Worker started");

        Ok(WorkerSlot {
            id,
            shared,
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Close every in-flight connection, stop all workers and wait for them.
    pub fn shutdown(&self) {
        let threads: Vec<(usize, JoinHandle<()>)> = {
            let mut state = self.state();
            state.closed = true;

            state
                .slots
                .iter_mut()
                .filter_map(|slot| {
                    if let Some(closer) = slot.shared.in_flight().as_ref() {
                        if let Err(e) = closer.shutdown() {
                            debug!(worker = slot.id, error = %e, "Failed to close connection");
                        }
                    }
                    // Disconnecting the channel ends the worker loop
                    slot.sender.take();
                    slot.thread.take().map(|thread| (slot.id, thread))
                })
                .collect()
        };

        for (id, thread) in threads {
            if thread.join().is_err() {
                error!(worker = id, "Worker thread panicked");
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state();
        state
            .slots
            .iter()
            .fold(PoolStats::default(), |mut stats, slot| {
                stats.workers += 1;
                if slot.shared.in_flight().is_some() {
                    stats.busy += 1;
                }
                stats.served += slot.shared.served.load(Ordering::Relaxed);
                stats
            })
    }
}

/// The thread side of a slot.
struct Worker {
    id: usize,
    shared: Arc<WorkerShared>,
    handler: Arc<HandlerSlot>,
    receiver: Receiver<Box<dyn Stream>>,
}

impl Worker {
    fn run(self) {
        while let Ok(mut stream) = self.receiver.recv() {
            self.process(&mut *stream);

            // Idle before the peer can see the connection close
            self.shared.in_flight().take();
            self.shared.served.fetch_add(1, Ordering::Relaxed);
            drop(stream);
        }

        debug!(worker = self.id, "Worker stopped");
    }

    fn process(&self, stream: &mut dyn Stream) {
        let Some(handler) = self.handler.load() else {
            warn!(worker = self.id, "No handler set, dropping connection");
            return;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(stream))) {
            Ok(Ok(())) => trace!(worker = self.id, "Request processed"),
            Ok(Err(e)) => warn!(worker = self.id, error = %e, "Process failed"),
            Err(payload) => error!(
                worker = self.id,
                panic = panic_message(payload.as_ref()),
                "Handler panicked"
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
