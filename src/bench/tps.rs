//! Sliding one second event counter.
//!
//! Events land in an atomic pending counter. A ticker calls `tick` every
//! 10 ms, moving the pending count into the next slot of a 100 slot ring,
//! so the ring sum is the number of events in the trailing second.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

pub const SLOTS: usize = 100;
pub const TICK: Duration = Duration::from_millis(10);

pub struct TpsMeter {
    pending: AtomicU32,
    slots: [AtomicU32; SLOTS],
    /// Next slot to overwrite
    cursor: AtomicUsize,
}

impl TpsMeter {
    pub fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            slots: std::array::from_fn(|_| AtomicU32::new(0)),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn record(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Rotate the ring; only one task may tick a meter
    pub fn tick(&self) -> u32 {
        let n = self.pending.swap(0, Ordering::AcqRel);
        let cursor = self.cursor.load(Ordering::Relaxed);
        self.slots[cursor].store(n, Ordering::Release);
        self.cursor.store((cursor + 1) % SLOTS, Ordering::Relaxed);
        self.window()
    }

    /// Events in the trailing second, not counting the pending tick
    pub fn window(&self) -> u32 {
        self.slots.iter().map(|s| s.load(Ordering::Acquire)).sum()
    }

    /// Trailing second plus what has not been ticked yet
    pub fn current(&self) -> u32 {
        self.window() + self.pending.load(Ordering::Acquire)
    }
}

impl Default for TpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// The counters one case run maintains
#[derive(Default)]
pub struct Meters {
    /// Requests dispatched, drives the rate limit
    pub issued: TpsMeter,
    pub total: TpsMeter,
    pub succeeded: TpsMeter,
    pub failed: TpsMeter,
}

impl Meters {
    pub fn complete(&self, succeeded: bool) {
        self.total.record();
        if succeeded {
            self.succeeded.record();
        } else {
            self.failed.record();
        }
    }

    /// Tick every meter, returning the total window
    pub fn tick(&self) -> u32 {
        self.issued.tick();
        self.succeeded.tick();
        self.failed.tick();
        self.total.tick()
    }
}
