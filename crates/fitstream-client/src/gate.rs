//! Single-slot backpressure flag between the sampler and the channel.
//!
//! Set when a frame is handed to the channel; cleared by the matching
//! processed event, by any channel error, or when the sampler stops. While
//! set, sampling ticks are skipped, so at most one frame per channel is ever
//! outstanding.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    /// Frames admitted through the gate.
    pub sent: u64,
    /// Ticks skipped because a frame was outstanding.
    pub skipped: u64,
    /// Clears that released an outstanding frame.
    pub cleared: u64,
}

#[derive(Debug, Default)]
pub struct BackpressureGate {
    set: AtomicBool,
    sent: AtomicU64,
    skipped: AtomicU64,
    cleared: AtomicU64,
}

impl BackpressureGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. Returns `false` if a frame is already outstanding.
    pub fn try_set(&self) -> bool {
        let won = self
            .set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
        won
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Count a tick that saw the gate set and did nothing.
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Release the slot; returns whether a frame was outstanding.
    pub fn clear(&self) -> bool {
        let was_set = self.set.swap(false, Ordering::AcqRel);
        if was_set {
            self.cleared.fetch_add(1, Ordering::Relaxed);
        }
        was_set
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            sent: self.sent.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
        }
    }
}
