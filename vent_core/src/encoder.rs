//! Interrupt-side tick counting.
//!
//! The encoder ISR must do the minimal possible work: bump a counter by the
//! currently commanded direction sign. [`TickCounter`] is the consumer-side
//! view owned by the actuator; [`PulseHandle`] is the clone handed to the
//! interrupt context. The count is the single piece of state shared across
//! the concurrency boundary, so both sides go through atomics.

use std::sync::Arc;
use std::sync::atomic::{AtomicI8, AtomicI64, Ordering};

use vent_traits::Direction;

#[derive(Debug)]
struct Shared {
    ticks: AtomicI64,
    sign: AtomicI8,
}

/// Consumer-side view of the encoder count.
///
/// The count is relative: it only gains an absolute meaning after homing
/// zeroes it against the mechanical stop.
#[derive(Debug, Clone)]
pub struct TickCounter {
    shared: Arc<Shared>,
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TickCounter {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                ticks: AtomicI64::new(0),
                sign: AtomicI8::new(0),
            }),
        }
    }

    /// Handle for the interrupt context. Cheap to clone; `pulse()` is the
    /// only call allowed from the ISR.
    pub fn isr_handle(&self) -> PulseHandle {
        PulseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn ticks(&self) -> i64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    pub fn zero(&self) {
        self.shared.ticks.store(0, Ordering::Relaxed);
    }

    /// Record the sign pulses are counted with. The last commanded direction
    /// is kept after a stop so externally induced shaft movement still
    /// registers (with its magnitude, not necessarily its true sign).
    pub(crate) fn set_commanded(&self, direction: Direction) {
        self.shared.sign.store(direction.sign(), Ordering::Relaxed);
    }
}

/// Interrupt-context handle: one atomic add per encoder edge, nothing else.
#[derive(Debug, Clone)]
pub struct PulseHandle {
    shared: Arc<Shared>,
}

impl PulseHandle {
    #[inline]
    pub fn pulse(&self) {
        let sign = self.shared.sign.load(Ordering::Relaxed);
        if sign != 0 {
            self.shared.ticks.fetch_add(i64::from(sign), Ordering::Relaxed);
        }
    }
}
