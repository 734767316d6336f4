//! Cancellable counting gate
//!
//! A small semaphore used for both concurrency tiers: the global host
//! cap and the per-host share cap. Acquisition blocks until a permit is
//! free or the gate is cancelled; cancellation wakes every waiter at
//! once so a host deadline can unblock all pending share sub-tasks.

use parking_lot::{Condvar, Mutex};

struct GateState {
    available: usize,
    cancelled: bool,
}

/// Counting gate with cancellation
pub struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    pub fn new(permits: usize) -> Self {
        Gate {
            state: Mutex::new(GateState {
                available: permits,
                cancelled: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Acquire a permit, blocking while none are free.
    ///
    /// Returns `None` once the gate has been cancelled.
    pub fn acquire(&self) -> Option<GatePermit<'_>> {
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return None;
            }
            if state.available > 0 {
                state.available -= 1;
                return Some(GatePermit { gate: self });
            }
            self.cond.wait(&mut state);
        }
    }

    /// Acquire without blocking.
    pub fn try_acquire(&self) -> Option<GatePermit<'_>> {
        let mut state = self.state.lock();
        if state.cancelled || state.available == 0 {
            return None;
        }
        state.available -= 1;
        Some(GatePermit { gate: self })
    }

    /// Cancel the gate: current and future waiters get `None`.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        drop(state);
        self.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.available += 1;
        drop(state);
        self.cond.notify_one();
    }
}

/// RAII permit; releasing happens on drop
pub struct GatePermit<'a> {
    gate: &'a Gate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
