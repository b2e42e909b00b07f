//! Shared counter block used for low-overhead signaling between the
//! coordinator and a worker.
//!
//! The coordinator bumps [`REQUEST_COUNT_FIELD`] after posting a request; the
//! worker bumps [`RESPONSE_COUNT_FIELD`] after posting a response. Either side
//! compares its last observed value against the current one before touching
//! the channel, which keeps the common "nothing new" case to a single atomic
//! load.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Index of the outbound request counter.
pub const REQUEST_COUNT_FIELD: usize = 0;
/// Index of the inbound response counter.
pub const RESPONSE_COUNT_FIELD: usize = 1;
/// Number of fields in the block. Fields past the two counters are reserved.
pub const FIELD_COUNT: usize = 4;

struct CounterBlock {
    fields: [AtomicI32; FIELD_COUNT],
    /// Paired with `wake` so a notify cannot slip between a waiter's check
    /// and its sleep.
    gate: Mutex<()>,
    wake: Condvar,
}

/// Fixed-size atomic integer block shared by both sides of a worker channel.
///
/// Cloning yields another view of the same block.
#[derive(Clone)]
pub struct SharedCounters {
    block: Arc<CounterBlock>,
}

impl SharedCounters {
    /// Allocate a zeroed block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            block: Arc::new(CounterBlock {
                fields: std::array::from_fn(|_| AtomicI32::new(0)),
                gate: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// Atomically read a field.
    ///
    /// # Panics
    ///
    /// Panics if `field >= FIELD_COUNT`.
    #[must_use]
    pub fn load(&self, field: usize) -> i32 {
        self.block.fields[field].load(Ordering::Acquire)
    }

    /// Atomically increment a field and wake every thread waiting on it.
    /// Returns the new value.
    ///
    /// # Panics
    ///
    /// Panics if `field >= FIELD_COUNT`.
    pub fn add_and_notify(&self, field: usize) -> i32 {
        let next = self.block.fields[field]
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);
        let _gate = self.block.gate.lock();
        self.block.wake.notify_all();
        next
    }

    /// Block until `field` differs from `seen` or `timeout` elapses.
    /// Returns the value observed last.
    ///
    /// # Panics
    ///
    /// Panics if `field >= FIELD_COUNT`.
    pub fn wait_for_change(&self, field: usize, seen: i32, timeout: Duration) -> i32 {
        let mut gate = self.block.gate.lock();
        loop {
            let current = self.load(field);
            if current != seen {
                return current;
            }
            if self.block.wake.wait_for(&mut gate, timeout).timed_out() {
                return self.load(field);
            }
        }
    }
}

impl Default for SharedCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCounters")
            .field("requests", &self.load(REQUEST_COUNT_FIELD))
            .field("responses", &self.load(RESPONSE_COUNT_FIELD))
            .finish()
    }
}
