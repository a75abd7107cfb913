//! # Deterministic Simulation Source
//!
//! A software tick source and a harness that drives it the way real
//! hardware would: the register moves first, and the halfway/overflow
//! events are delivered afterwards, in order. This is what makes every
//! timing property in this crate testable on the host with fixed tick
//! sequences instead of sleeps.
//!
//! ```text
//!     SimClock::advance_ticks(n):
//!
//!     register ──► half-range crossed? ──► clock.on_halfway()
//!         │
//!         └──────► wrapped to zero? ─────► clock.on_overflow()
//! ```
//!
//! [`SimClock::advance_raw`] moves the register *without* delivering
//! events, modeling interrupt latency: the hardware has wrapped but the
//! handler has not run yet. That window is precisely what the clock's
//! halfway compensation exists for.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::clock::{Clock, MonotonicClock, TickSource, HALF_RANGE};

/// An in-memory 32-bit counter register implementing [`TickSource`].
///
/// The register only moves when told to; nothing ticks in the
/// background. Advance it through [`SimClock`] to get hardware-ordered
/// event delivery, or poke it directly with [`set`](FakeTickSource::set)
/// to build pathological scenarios.
#[derive(Debug)]
pub struct FakeTickSource {
    register: AtomicU32,
    running: AtomicBool,
    frequency_hz: u32,
}

impl FakeTickSource {
    /// Creates a stopped fake counter at the given frequency.
    pub fn new(frequency_hz: u32) -> Self {
        Self {
            register: AtomicU32::new(0),
            running: AtomicBool::new(false),
            frequency_hz,
        }
    }

    /// Sets the register to an arbitrary value, delivering no events.
    pub fn set(&self, ticks: u32) {
        self.register.store(ticks, Ordering::Relaxed);
    }

    /// Whether [`start`](TickSource::start) has been called without a
    /// matching [`stop`](TickSource::stop).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl TickSource for FakeTickSource {
    fn read(&self) -> u32 {
        self.register.load(Ordering::Relaxed)
    }

    fn load(&self, ticks: u32) {
        self.register.store(ticks, Ordering::Relaxed);
    }

    fn start(&self) {
        self.running.store(true, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }
}

/// A [`MonotonicClock`] over a [`FakeTickSource`], advanced manually.
///
/// Implements [`Clock`], so timeouts and limiters run against it
/// unchanged:
///
/// ```rust
/// use monotick::{SimClock, TokenBucket, TokenBucketConfig};
///
/// let sim = SimClock::new(1_000_000);
/// let mut bucket = TokenBucket::new(&sim, TokenBucketConfig::per_second(10));
///
/// assert!(bucket.allowed(5));
/// sim.advance_micros(500_000);
/// // half a second later, five more tokens have accrued
/// assert!(bucket.allowed(5));
/// ```
#[derive(Debug)]
pub struct SimClock {
    clock: MonotonicClock<FakeTickSource>,
}

impl SimClock {
    /// Creates a running simulated clock at the given frequency.
    ///
    /// # Panics
    ///
    /// Panics if `frequency_hz` is not a whole number of MHz, same as
    /// [`MonotonicClock::new`].
    pub fn new(frequency_hz: u32) -> Self {
        Self {
            clock: MonotonicClock::new(FakeTickSource::new(frequency_hz)),
        }
    }

    /// The clock under simulation.
    pub fn clock(&self) -> &MonotonicClock<FakeTickSource> {
        &self.clock
    }

    /// Current 64-bit tick count (see [`MonotonicClock::now`]).
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Advances the register by `ticks`, delivering halfway and
    /// overflow events exactly where hardware would raise them.
    pub fn advance_ticks(&self, ticks: u64) {
        let source = self.clock.source();
        let mut remaining = ticks;

        while remaining > 0 {
            let register = source.read();
            // Distance to the next event boundary: half range going up,
            // or the wrap back to zero.
            let to_boundary = if register < HALF_RANGE {
                (HALF_RANGE - register) as u64
            } else {
                (1u64 << 32) - register as u64
            };

            let step = remaining.min(to_boundary);
            let next = register.wrapping_add(step as u32);
            source.set(next);

            if step == to_boundary {
                if register < HALF_RANGE {
                    self.clock.on_halfway();
                } else {
                    self.clock.on_overflow();
                }
            }
            remaining -= step;
        }
    }

    /// Advances the register by a whole number of microseconds.
    pub fn advance_micros(&self, micros: u64) {
        self.advance_ticks(self.clock.micros_to_ticks(micros));
    }

    /// Moves the register by `ticks` without delivering any events.
    ///
    /// Models the window where the counter has already moved (possibly
    /// across a wrap) but the interrupt handler has not yet run.
    pub fn advance_raw(&self, ticks: u32) {
        let source = self.clock.source();
        source.set(source.read().wrapping_add(ticks));
    }
}

impl Clock for SimClock {
    #[inline]
    fn now(&self) -> u64 {
        self.clock.now()
    }

    #[inline]
    fn ticks_per_micro(&self) -> u32 {
        Clock::ticks_per_micro(&self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_source_lifecycle() {
        let source = FakeTickSource::new(1_000_000);
        assert!(!source.is_running());
        source.start();
        assert!(source.is_running());
        source.load(99);
        assert_eq!(source.read(), 99);
        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn test_advance_delivers_halfway_then_overflow() {
        let sim = SimClock::new(1_000_000);

        // One full wrap in a single call: both events, in order, and
        // the 64-bit value accounts for the wrap.
        sim.advance_ticks(1u64 << 32);
        assert_eq!(sim.clock.source().read(), 0);
        assert_eq!(sim.now(), 1u64 << 32);
    }

    #[test]
    fn test_advance_stops_exactly_on_boundaries() {
        let sim = SimClock::new(1_000_000);

        sim.advance_ticks(HALF_RANGE as u64);
        assert_eq!(sim.clock.source().read(), HALF_RANGE);
        assert_eq!(sim.now(), HALF_RANGE as u64);

        sim.advance_ticks(HALF_RANGE as u64);
        assert_eq!(sim.clock.source().read(), 0);
        assert_eq!(sim.now(), 1u64 << 32);
    }

    #[test]
    fn test_advance_raw_skips_events() {
        let sim = SimClock::new(1_000_000);

        sim.advance_ticks(0xC000_0000);
        // Wrap the register with no handler: state says "no overflow
        // yet", only the halfway flag lets now() stay correct.
        sim.advance_raw(0x5000_0000);
        assert_eq!(sim.clock.source().read(), 0x1000_0000);
        assert_eq!(sim.now(), (1u64 << 32) | 0x1000_0000);
    }

    #[test]
    fn test_advance_micros_uses_frequency() {
        let sim = SimClock::new(3_000_000);
        sim.advance_micros(10);
        assert_eq!(sim.clock.source().read(), 30);
    }
}
