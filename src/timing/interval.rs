//! # Periodic Interval Dispatch
//!
//! A registered set of (period, callback) entries driven by a modulo
//! counter. The update step ([`IntervalSet::tick`]) runs from the tick
//! context and only marks entries due; the dispatch step
//! ([`IntervalSet::poll`]) runs from the owner's main loop and invokes
//! the callbacks. Splitting the two keeps callback execution out of
//! interrupt context.
//!
//! ```text
//!     tick(seconds) ──► counter % period == 0 ──► due flag set
//!                                                     │
//!     poll() ◄───────────── main loop ◄───────────────┘
//! ```
//!
//! Periods share whatever unit `tick` is fed in: feed it seconds and a
//! period of 5 fires every 5 seconds. Repeated calls with the same time
//! value are ignored, so `tick` may be called faster than the unit
//! advances.

use tracing::{debug, warn};

/// Default maximum number of registered intervals.
pub const MAX_INTERVALS: usize = 5;

struct IntervalSlot {
    period: u32,
    due: bool,
    callback: Box<dyn FnMut() + Send>,
}

impl std::fmt::Debug for IntervalSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalSlot")
            .field("period", &self.period)
            .field("due", &self.due)
            .finish()
    }
}

/// Fixed-capacity set of periodic callbacks.
///
/// Single-owner: both [`tick`](IntervalSet::tick) and
/// [`poll`](IntervalSet::poll) take `&mut self`; when the update step
/// runs in an interrupt, the owner provides the handoff (a flag or
/// queue) - this type does not.
///
/// # Example
///
/// ```rust
/// use monotick::IntervalSet;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// let fired = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&fired);
///
/// let mut intervals = IntervalSet::new();
/// assert!(intervals.add(5, move || {
///     counter.fetch_add(1, Ordering::Relaxed);
/// }));
///
/// for second in 1..=10 {
///     intervals.tick(second);
///     intervals.poll();
/// }
/// assert_eq!(fired.load(Ordering::Relaxed), 2); // at 5s and 10s
/// ```
pub struct IntervalSet {
    slots: Vec<IntervalSlot>,
    capacity: usize,
    last_time: u32,
    counter: u32,
    poll_required: bool,
}

impl IntervalSet {
    /// Creates an empty set with the default capacity
    /// ([`MAX_INTERVALS`]).
    pub fn new() -> Self {
        Self::with_capacity(MAX_INTERVALS)
    }

    /// Creates an empty set holding at most `capacity` intervals.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            last_time: 0,
            counter: 0,
            poll_required: false,
        }
    }

    /// Registers a callback fired every `period` time units.
    ///
    /// Returns `false` when the set is full or `period` is zero;
    /// registration is the only place this can fail, dispatch never
    /// does.
    pub fn add(&mut self, period: u32, callback: impl FnMut() + Send + 'static) -> bool {
        if period == 0 {
            warn!("zero-period interval rejected");
            return false;
        }
        if self.slots.len() >= self.capacity {
            warn!(period, "interval set full, registration rejected");
            return false;
        }
        debug!(period, slot = self.slots.len(), "interval registered");
        self.slots.push(IntervalSlot {
            period,
            due: false,
            callback: Box::new(callback),
        });
        true
    }

    /// Update step: advances the modulo counter and marks due entries.
    ///
    /// `time` is the current time in the chosen unit. Zero and repeats
    /// of the previous value are ignored, so calling this more often
    /// than the unit advances is harmless.
    pub fn tick(&mut self, time: u32) {
        if time == 0 || time == self.last_time {
            return;
        }
        self.last_time = time;
        self.counter = self.counter.wrapping_add(1);

        for slot in &mut self.slots {
            if self.counter % slot.period == 0 {
                slot.due = true;
                self.poll_required = true;
            }
        }
    }

    /// Dispatch step: runs and clears every due callback.
    ///
    /// Clears `poll_required` up front: an update step racing in during
    /// dispatch may set it again, and the next poll picks that up.
    pub fn poll(&mut self) {
        self.poll_required = false;

        for slot in &mut self.slots {
            if slot.due {
                slot.due = false;
                (slot.callback)();
            }
        }
    }

    /// Whether any entry is waiting to be dispatched.
    pub fn poll_required(&self) -> bool {
        self.poll_required
    }

    /// Number of registered intervals.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no intervals are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for IntervalSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IntervalSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalSet")
            .field("slots", &self.slots)
            .field("capacity", &self.capacity)
            .field("counter", &self.counter)
            .field("poll_required", &self.poll_required)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_callback() -> (Arc<AtomicU32>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn test_registration_capacity() {
        let mut intervals = IntervalSet::with_capacity(2);
        assert!(intervals.add(1, || {}));
        assert!(intervals.add(2, || {}));
        assert!(!intervals.add(3, || {}));
        assert_eq!(intervals.len(), 2);
    }

    #[test]
    fn test_zero_period_rejected() {
        let mut intervals = IntervalSet::new();
        assert!(!intervals.add(0, || {}));
        assert!(intervals.is_empty());
        intervals.tick(1);
        intervals.poll();
    }

    #[test]
    fn test_fires_on_period_multiples() {
        let (count, callback) = counting_callback();
        let mut intervals = IntervalSet::new();
        assert!(intervals.add(3, callback));

        for second in 1..=9 {
            intervals.tick(second);
            intervals.poll();
        }
        assert_eq!(count.load(Ordering::Relaxed), 3); // 3s, 6s, 9s
    }

    #[test]
    fn test_tick_ignores_zero_and_repeats() {
        let (count, callback) = counting_callback();
        let mut intervals = IntervalSet::new();
        assert!(intervals.add(1, callback));

        intervals.tick(0);
        intervals.tick(0);
        assert!(!intervals.poll_required());

        // Called five times for the same second: one firing.
        for _ in 0..5 {
            intervals.tick(7);
        }
        intervals.poll();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_poll_required_handoff() {
        let (_, callback) = counting_callback();
        let mut intervals = IntervalSet::new();
        assert!(intervals.add(2, callback));

        intervals.tick(1);
        assert!(!intervals.poll_required());
        intervals.tick(2);
        assert!(intervals.poll_required());

        intervals.poll();
        assert!(!intervals.poll_required());
    }

    #[test]
    fn test_missed_poll_fires_once() {
        let (count, callback) = counting_callback();
        let mut intervals = IntervalSet::new();
        assert!(intervals.add(2, callback));

        // Two due marks before a poll collapse into one firing.
        intervals.tick(2);
        intervals.tick(3);
        intervals.tick(4);
        intervals.poll();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_multiple_intervals_independent() {
        let (fast_count, fast) = counting_callback();
        let (slow_count, slow) = counting_callback();
        let mut intervals = IntervalSet::new();
        assert!(intervals.add(2, fast));
        assert!(intervals.add(5, slow));

        for second in 1..=10 {
            intervals.tick(second);
            intervals.poll();
        }
        assert_eq!(fast_count.load(Ordering::Relaxed), 5);
        assert_eq!(slow_count.load(Ordering::Relaxed), 2);
    }
}
