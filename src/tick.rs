//! Interrupt-driven tick counting
//!
//! The hardware timer interrupt only ever calls [`TickCounter::tick`]. That
//! single-word increment is the sole state shared with interrupt context; the
//! main loop reads it and keeps its own completion count.

use portable_atomic::{AtomicU32, Ordering};

/// Monotonic count of timer firings, wrapping on overflow.
///
/// Meant to live in a `static` so the interrupt handler can reach it:
///
/// ```rust
/// use pico_recorder::TickCounter;
///
/// static TICKS: TickCounter = TickCounter::new();
///
/// // inside the timer interrupt
/// TICKS.tick();
/// assert_eq!(TICKS.count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct TickCounter {
    count: AtomicU32,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Record one timer firing. Safe to call from interrupt context.
    #[inline]
    pub fn tick(&self) {
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Current tick count.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

/// A periodic hardware timer that drives a [`TickCounter`].
///
/// Reconfiguring replaces the running period; there is no separate teardown.
pub trait TickSource {
    /// Switch the timer to `frequency_hz`. Returns `false` if the hardware
    /// cannot generate that rate, in which case the previous rate keeps running.
    fn configure(&mut self, frequency_hz: f32) -> bool;
}

impl<T: TickSource + ?Sized> TickSource for &mut T {
    fn configure(&mut self, frequency_hz: f32) -> bool {
        (**self).configure(frequency_hz)
    }
}
