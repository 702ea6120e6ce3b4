//! Synchronous change notifications with explicit subscription handles.
//!
//! Every strategy notification (position changed, new trade, ...) is an
//! [`Event`]. Subscribing returns a [`Subscription`]; unsubscribing is
//! idempotent and is also performed when the handle is dropped.
//!
//! # Dispatch
//!
//! ```text
//! raise(value) → snapshot handlers (lock released) → for each live handler: handler(value)?
//! ```
//!
//! Handlers run on the raising thread, in subscription order. The first
//! handler error stops the dispatch and is returned to the raiser. Because the
//! lock is not held while handlers run, a handler may subscribe, unsubscribe
//! (itself included) or raise other events.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

use crate::error::StrategyResult;

/// Outcome of a single handler invocation.
pub type HandlerResult = StrategyResult<()>;

type Handler<T> = Arc<dyn Fn(&T) -> HandlerResult + Send + Sync>;

struct Slot<T> {
    id: u64,
    live: Arc<AtomicBool>,
    handler: Handler<T>,
}

type Slots<T> = Mutex<Vec<Slot<T>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Handlers never run under this lock, so a poisoned list is still consistent.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Event
// =============================================================================

/// A notification source that handlers can attach to.
pub struct Event<T> {
    name: &'static str,
    slots: Arc<Slots<T>>,
    next_id: AtomicU64,
}

impl<T: 'static> Event<T> {
    /// Create an event with a diagnostic name.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Diagnostic name of this event.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Attach a handler.
    ///
    /// The handler stays attached until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let live = Arc::new(AtomicBool::new(true));

        lock(&self.slots).push(Slot {
            id,
            live: Arc::clone(&live),
            handler: Arc::new(handler),
        });

        debug!(event = self.name, subscription = id, "Handler attached");

        let slots: Weak<Slots<T>> = Arc::downgrade(&self.slots);
        Subscription {
            id,
            event: self.name,
            live,
            detach: Mutex::new(Some(Box::new(move || {
                if let Some(slots) = slots.upgrade() {
                    lock(&slots).retain(|slot| slot.id != id);
                }
            }))),
        }
    }

    /// Deliver `value` to every live handler.
    ///
    /// # Errors
    /// Returns the first handler error; remaining handlers are not invoked.
    pub fn raise(&self, value: &T) -> HandlerResult {
        let snapshot: Vec<(Arc<AtomicBool>, Handler<T>)> = lock(&self.slots)
            .iter()
            .map(|slot| (Arc::clone(&slot.live), Arc::clone(&slot.handler)))
            .collect();

        for (live, handler) in snapshot {
            // Re-checked per handler: an earlier handler may have disposed a later one.
            if live.load(Ordering::Acquire) {
                handler(value)?;
            }
        }

        Ok(())
    }

    /// Number of attached handlers.
    pub fn handler_count(&self) -> usize {
        lock(&self.slots).len()
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("handlers", &lock(&self.slots).len())
            .finish()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle for one attached handler.
///
/// `unsubscribe` detaches exactly once; later and concurrent calls are no-ops.
/// Dropping the handle unsubscribes.
pub struct Subscription {
    id: u64,
    event: &'static str,
    live: Arc<AtomicBool>,
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Detach the handler.
    ///
    /// Returns `true` only for the call that actually detached it.
    pub fn unsubscribe(&self) -> bool {
        if !self.live.swap(false, Ordering::AcqRel) {
            return false;
        }

        let detach = lock(&self.detach).take();
        if let Some(detach) = detach {
            detach();
        }

        debug!(event = self.event, subscription = self.id, "Handler detached");
        true
    }

    /// True until `unsubscribe` has been called.
    pub fn is_active(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Name of the event this subscription is attached to.
    pub fn event_name(&self) -> &'static str {
        self.event
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
