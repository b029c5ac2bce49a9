//! Pluggable request handlers and the slot they are swapped through.

use crate::stream::Stream;
use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Error reported by a handler for a single connection.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Application-level protocol run on one connection.
///
/// A handler reads one request from the stream and writes one response. It
/// must not assume the stream outlives the call: the worker closes it as
/// soon as `handle` returns.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, stream: &mut dyn Stream) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&mut dyn Stream) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, stream: &mut dyn Stream) -> Result<(), HandlerError> {
        self(stream)
    }
}

/// The currently active handler, replaceable as a whole.
///
/// Readers take a snapshot with `load` and run it without holding any lock,
/// so a swap never waits on an in-flight request and vice versa. The slot is
/// an epoch-protected pointer: a replaced handle is reclaimed only after
/// every reader pinned at swap time has cloned its snapshot. Every `store`
/// bumps the version.
#[derive(Default)]
pub struct HandlerSlot {
    current: Atomic<Arc<dyn Handler>>,
    version: AtomicU64,
}

impl HandlerSlot {
    pub fn new(handler: Option<Arc<dyn Handler>>) -> Self {
        let current = match handler {
            Some(handler) => Atomic::new(handler),
            None => Atomic::null(),
        };
        Self {
            current,
            version: AtomicU64::new(0),
        }
    }

    /// Snapshot of the active handler.
    pub fn load(&self) -> Option<Arc<dyn Handler>> {
        let guard = epoch::pin();
        let current = self.current.load(Ordering::Acquire, &guard);
        // SAFETY: the pointer is either null or was published by `new` or
        // `store`; `guard` keeps it from being reclaimed until the clone.
        unsafe { current.as_ref() }.cloned()
    }

    /// Replace the active handler. Returns the new version.
    pub fn store(&self, handler: Arc<dyn Handler>) -> u64 {
        let guard = epoch::pin();
        let old = self.current.swap(Owned::new(handler), Ordering::AcqRel, &guard);
        if !old.is_null() {
            // SAFETY: `old` is unreachable from the slot now; readers that
            // still see it are pinned and finish before it is destroyed.
            unsafe { guard.defer_destroy(old) };
        }
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of swaps performed so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl Drop for HandlerSlot {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no reader can hold a reference into the slot.
        unsafe {
            let guard = epoch::unprotected();
            let current = self.current.swap(Shared::null(), Ordering::Relaxed, guard);
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}
