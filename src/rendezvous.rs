//! Single-slot rendezvous between the blocked caller and whoever resolves it.
//!
//! [`channel`] returns a [`Resolver`] and a [`Waiter`]. The resolver is
//! consumed by [`Resolver::resolve`], so a slot is released at most once.
//! The waiter blocks with a deadline and also wakes if the resolver is
//! dropped without resolving.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

enum SlotState<T> {
    Empty,
    Filled(T),
    Abandoned,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

/// Outcome of [`Waiter::wait_timeout`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WaitOutcome<T> {
    /// The resolver delivered a value
    Resolved(T),
    /// The deadline passed first
    TimedOut,
    /// The resolver was dropped without a value
    Abandoned,
}

/// Producer half; resolving consumes it.
pub(crate) struct Resolver<T> {
    slot: Option<Arc<Slot<T>>>,
}

/// Consumer half.
pub(crate) struct Waiter<T> {
    slot: Arc<Slot<T>>,
}

/// Creates a connected resolver/waiter pair.
pub(crate) fn channel<T>() -> (Resolver<T>, Waiter<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(SlotState::Empty),
        ready: Condvar::new(),
    });
    (
        Resolver {
            slot: Some(Arc::clone(&slot)),
        },
        Waiter { slot },
    )
}

impl<T> Resolver<T> {
    /// Stores `value` and wakes the waiter.
    pub(crate) fn resolve(mut self, value: T) {
        if let Some(slot) = self.slot.take() {
            fill(&slot, SlotState::Filled(value));
        }
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            fill(&slot, SlotState::Abandoned);
        }
    }
}

fn fill<T>(slot: &Slot<T>, next: SlotState<T>) {
    let mut state = slot.state.lock();
    if matches!(*state, SlotState::Empty) {
        *state = next;
        slot.ready.notify_one();
    }
}

impl<T> Waiter<T> {
    /// Blocks until the slot is filled or `timeout` elapses.
    ///
    /// A timeout too large to express as a deadline waits without one.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> WaitOutcome<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.slot.state.lock();
        loop {
            match std::mem::replace(&mut *state, SlotState::Empty) {
                SlotState::Filled(value) => return WaitOutcome::Resolved(value),
                SlotState::Abandoned => return WaitOutcome::Abandoned,
                SlotState::Empty => {}
            }
            let Some(deadline) = deadline else {
                self.slot.ready.wait(&mut state);
                continue;
            };
            if self.slot.ready.wait_until(&mut state, deadline).timed_out() {
                return match std::mem::replace(&mut *state, SlotState::Empty) {
                    SlotState::Filled(value) => WaitOutcome::Resolved(value),
                    SlotState::Abandoned => WaitOutcome::Abandoned,
                    SlotState::Empty => WaitOutcome::TimedOut,
                };
            }
        }
    }
}
