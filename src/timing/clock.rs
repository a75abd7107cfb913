//! # Monotonic Timestamp Engine
//!
//! This module turns a free-running 32-bit hardware counter into a
//! 64-bit tick count that never goes backwards, readable from any
//! execution context without taking a lock.
//!
//! ## The Problem
//!
//! ```text
//!     Hardware gives us:              We want:
//!
//!     ┌────────────────┐             ┌────────────────────────────┐
//!     │ 32-bit counter │             │ 64-bit monotonic timestamp │
//!     │ wraps every    │    ──►      │ wraps after ~584k years    │
//!     │ ~71 min @ 1MHz │             │ at 1 MHz                   │
//!     └────────────────┘             └────────────────────────────┘
//! ```
//!
//! The timestamp is `(overflow_count << 32) | register`. The catch is
//! that those two halves cannot be read atomically: the register can
//! wrap between reading `overflow_count` and reading the register, and
//! the wraparound interrupt can run in the middle of the read - or on
//! a different core entirely.
//!
//! ## The Solution
//!
//! Two mechanisms cooperate:
//!
//! 1. **Sequence lock** - the wraparound handler brackets its update
//!    with an even/odd generation counter. A reader that observes a
//!    changed (or odd) counter re-reads. The writer's critical section
//!    is a handful of instructions, so a retry nearly always succeeds
//!    on the first attempt.
//! 2. **Halfway flag** - set once the register crosses half its range,
//!    cleared at each wrap. A reader that sees the flag set while the
//!    register reads "small" knows a wrap happened moments ago that the
//!    handler has not yet recorded, and compensates by one overflow.
//!
//! ```text
//!     now() read protocol:
//!
//!     seq₁ ──► overflow, halfway ──► register ──► seq₂
//!       │                                           │
//!       └──────────── equal and even? ──────────────┘
//!                │                │
//!               yes               no ──► retry
//!                │
//!     halfway && register < half range?
//!                │
//!          yes: overflow + 1      no: overflow as read
//! ```
//!
//! The halfway flag is a heuristic, not a hard guarantee: it assumes a
//! reader's total latency (including preemption and cross-core delivery
//! of the wrap interrupt) stays well below **half the counter's wrap
//! period**. At 1 MHz that budget is ~35 minutes; at 200 MHz it is
//! still ~10 seconds. Systems that cannot meet it need a hardware
//! 64-bit counter instead.
//!
//! ## Execution Contexts
//!
//! - [`MonotonicClock::now`] - any context, any core, lock-free.
//! - [`MonotonicClock::on_halfway`] / [`MonotonicClock::on_overflow`] -
//!   the owning context only (the timer's interrupt handler, or the
//!   owning core when the timer is shared between cores).
//! - [`MonotonicClock::reinit`] / [`MonotonicClock::shutdown`] - the
//!   owning context only, with no concurrent readers expected to rely
//!   on continuity across the call.

use std::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};

use tracing::{debug, info, warn};

use super::utils::{Backoff, CacheAligned};

/// Half of the 32-bit counter range; the boundary the halfway flag
/// tracks, and the "reads small" threshold for wrap compensation.
pub(crate) const HALF_RANGE: u32 = 1 << 31;

/// Retry count after which a torn read is logged once per call.
///
/// The writer's critical section is O(1) instructions, so hitting this
/// means the reader is being continuously preempted by wrap handling,
/// which on real hardware indicates a misconfigured tick frequency.
const SEQ_RETRY_WARN: u32 = 16;

/// Maximum backoff step for the retry spin.
const SEQ_RETRY_MAX_STEP: u32 = 8;

/// Hardware abstraction for the free-running tick counter.
///
/// Implementations wrap a timer peripheral: a register that increments
/// at a fixed, known frequency and wraps at 2^32. Register access,
/// interrupt vector wiring and platform timer selection all live behind
/// this trait; the clock never touches hardware directly.
///
/// The crate ships one implementation,
/// [`FakeTickSource`](crate::FakeTickSource), for host-side tests and
/// simulation. Firmware supplies its own over MMIO.
pub trait TickSource: Send + Sync {
    /// Reads the live counter register.
    fn read(&self) -> u32;

    /// Reprograms the running counter to `ticks`.
    ///
    /// Used when resuming a timeline after the timer was powered down.
    fn load(&self, ticks: u32);

    /// Enables the counter and its compare events.
    fn start(&self);

    /// Disables the counter and its compare events.
    fn stop(&self);

    /// The fixed counting frequency in Hz.
    ///
    /// Must be an exact whole multiple of 1 MHz so that microsecond
    /// conversion is exact; anything else is rejected at clock
    /// construction.
    fn frequency_hz(&self) -> u32;
}

/// The time query interface consumed by everything above the engine.
///
/// Timeouts and both rate limiters depend on this trait rather than on
/// [`MonotonicClock`] directly, so tests can substitute a deterministic
/// source ([`SimClock`](crate::SimClock)) and feed it fixed tick
/// sequences.
pub trait Clock {
    /// Returns the current 64-bit tick count.
    fn now(&self) -> u64;

    /// Exact conversion factor: ticks per microsecond.
    fn ticks_per_micro(&self) -> u32;

    /// Converts a microsecond duration to ticks.
    #[inline]
    fn micros_to_ticks(&self, micros: u64) -> u64 {
        micros.saturating_mul(self.ticks_per_micro() as u64)
    }

    /// Microseconds between two timestamps, 0 if `end_tick < start_tick`.
    ///
    /// The zero result on reversed arguments is deliberate: timing code
    /// runs in interrupt context and must never panic on caller misuse.
    #[inline]
    fn elapsed_micros(&self, start_tick: u64, end_tick: u64) -> u64 {
        elapsed_ticks(start_tick, end_tick) / self.ticks_per_micro() as u64
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> u64 {
        (**self).now()
    }

    #[inline]
    fn ticks_per_micro(&self) -> u32 {
        (**self).ticks_per_micro()
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    #[inline]
    fn now(&self) -> u64 {
        (**self).now()
    }

    #[inline]
    fn ticks_per_micro(&self) -> u32 {
        (**self).ticks_per_micro()
    }
}

/// Ticks between two timestamps, 0 if `end < start`.
///
/// Never underflows; see [`Clock::elapsed_micros`] for the rationale.
#[inline]
pub fn elapsed_ticks(start: u64, end: u64) -> u64 {
    end.saturating_sub(start)
}

/// Writer-side state, mutated only by the owning context and kept on
/// its own cache line so readers on other cores never contend with
/// unrelated data.
#[derive(Debug, Default)]
struct ClockState {
    /// Sequence-lock generation counter: odd while an update is in
    /// flight, even when quiescent.
    seq: AtomicU32,
    /// Number of times the hardware counter has wrapped.
    overflow_count: AtomicU32,
    /// True once the counter crossed half its range since the last wrap.
    past_halfway: AtomicBool,
}

/// Wraparound-safe 64-bit monotonic clock over a 32-bit tick source.
///
/// One instance exists per timer domain and is passed explicitly to
/// every consumer (no module-global state). The instance is `Sync`:
/// share it as a `static`, via [`Arc`](std::sync::Arc), or by reference.
///
/// # Example
///
/// ```rust
/// use monotick::{Clock, FakeTickSource, MonotonicClock};
///
/// let clock = MonotonicClock::new(FakeTickSource::new(1_000_000));
/// let start = clock.now();
/// // ... work ...
/// let spent_us = clock.elapsed_micros(start, clock.now());
/// ```
pub struct MonotonicClock<S> {
    source: S,
    ticks_per_micro: u32,
    state: CacheAligned<ClockState>,
}

impl<S: TickSource> MonotonicClock<S> {
    /// Creates the clock and starts its tick source.
    ///
    /// # Panics
    ///
    /// Panics if the source frequency is zero or not a whole number of
    /// MHz. An unsupported timer configuration is a build/boot-time
    /// defect, not something to recover from at runtime.
    pub fn new(source: S) -> Self {
        Self::try_new(source).expect("unsupported tick source frequency")
    }

    /// Creates the clock, returning the error instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns an error message if the source frequency is zero or not
    /// a whole number of MHz.
    pub fn try_new(source: S) -> Result<Self, &'static str> {
        let ticks_per_micro = ticks_per_micro_for(source.frequency_hz())?;
        source.start();
        info!(
            frequency_mhz = ticks_per_micro,
            "monotonic clock started"
        );
        Ok(Self {
            source,
            ticks_per_micro,
            state: CacheAligned::new(ClockState::default()),
        })
    }

    /// Access to the underlying tick source, for the owner wiring
    /// interrupts or a test harness driving a fake.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the current 64-bit tick count.
    ///
    /// Safe to call from any context, including concurrently with the
    /// wraparound handler and from another core sharing the timer. The
    /// read is lock-free and retries on a torn snapshot; the retry loop
    /// is bounded in practice because the writer's critical section is
    /// a handful of instructions.
    pub fn now(&self) -> u64 {
        let state = self.state.get();
        let mut backoff = Backoff::new(SEQ_RETRY_MAX_STEP);
        let mut retries = 0u32;

        loop {
            let seq_before = state.seq.load(Ordering::Acquire);
            if seq_before & 1 == 0 {
                let high = state.overflow_count.load(Ordering::Relaxed);
                let past_halfway = state.past_halfway.load(Ordering::Relaxed);
                let low = self.source.read();
                fence(Ordering::Acquire);
                let seq_after = state.seq.load(Ordering::Relaxed);

                if seq_before == seq_after {
                    // The register can wrap after overflow_count was
                    // sampled and before the handler records it. A
                    // "small" register with the halfway flag still set
                    // is exactly that moment: count the wrap ourselves.
                    let high = if past_halfway && low < HALF_RANGE {
                        high.wrapping_add(1)
                    } else {
                        high
                    };
                    return ((high as u64) << 32) | low as u64;
                }
            }

            retries += 1;
            if retries == SEQ_RETRY_WARN {
                warn!(retries, "timestamp read repeatedly torn, still retrying");
            }
            backoff.backoff();
        }
    }

    /// Records that the counter crossed half its range.
    ///
    /// Call from the half-range compare interrupt (or the owning core's
    /// equivalent). Owner context only.
    pub fn on_halfway(&self) {
        self.write_section(|state| {
            state.past_halfway.store(true, Ordering::Relaxed);
        });
    }

    /// Records a counter wraparound.
    ///
    /// Call from the overflow interrupt. Owner context only.
    pub fn on_overflow(&self) {
        self.write_section(|state| {
            let wraps = state.overflow_count.load(Ordering::Relaxed);
            state.overflow_count.store(wraps.wrapping_add(1), Ordering::Relaxed);
            state.past_halfway.store(false, Ordering::Relaxed);
        });
    }

    /// Resumes the timeline at `timestamp`, e.g. after a sleep state
    /// powered the timer down.
    ///
    /// The counter register is reprogrammed from the low half and the
    /// overflow count from the high half; subsequent [`now`] calls
    /// behave as if the clock had kept ticking to `timestamp`. Owner
    /// context only.
    ///
    /// [`now`]: MonotonicClock::now
    pub fn reinit(&self, timestamp: u64) {
        self.source.stop();
        let low = timestamp as u32;
        self.write_section(|state| {
            state
                .overflow_count
                .store((timestamp >> 32) as u32, Ordering::Relaxed);
            state.past_halfway.store(low >= HALF_RANGE, Ordering::Relaxed);
        });
        self.source.load(low);
        self.source.start();
        debug!(timestamp, "monotonic clock reinitialized");
    }

    /// Stops the tick source and clears the clock state.
    ///
    /// After shutdown the clock reads as freshly reset; use
    /// [`reinit`](MonotonicClock::reinit) to bring it back with a
    /// preserved timeline. Owner context only.
    pub fn shutdown(&self) {
        self.source.stop();
        self.write_section(|state| {
            state.overflow_count.store(0, Ordering::Relaxed);
            state.past_halfway.store(false, Ordering::Relaxed);
        });
        debug!("monotonic clock shut down");
    }

    /// Sequence-locked write: bumps the generation counter to odd,
    /// applies the update, bumps it back to even. Single writer by
    /// contract, so plain store suffices for the bumps.
    fn write_section(&self, update: impl FnOnce(&ClockState)) {
        let state = self.state.get();
        let seq = state.seq.load(Ordering::Relaxed);
        state.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        update(state);
        state.seq.store(seq.wrapping_add(2), Ordering::Release);
    }
}

impl<S: TickSource> Clock for MonotonicClock<S> {
    #[inline]
    fn now(&self) -> u64 {
        MonotonicClock::now(self)
    }

    #[inline]
    fn ticks_per_micro(&self) -> u32 {
        self.ticks_per_micro
    }
}

impl<S> std::fmt::Debug for MonotonicClock<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.get();
        f.debug_struct("MonotonicClock")
            .field("ticks_per_micro", &self.ticks_per_micro)
            .field(
                "overflow_count",
                &state.overflow_count.load(Ordering::Relaxed),
            )
            .field(
                "past_halfway",
                &state.past_halfway.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// Validates the source frequency and derives the exact ticks-per-µs
/// factor.
fn ticks_per_micro_for(frequency_hz: u32) -> Result<u32, &'static str> {
    if frequency_hz == 0 {
        return Err("tick source frequency must be non-zero");
    }
    if frequency_hz % 1_000_000 != 0 {
        return Err("tick source frequency must be a whole number of MHz");
    }
    Ok(frequency_hz / 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::sim::{FakeTickSource, SimClock};
    use std::sync::Arc;

    #[test]
    fn test_now_composes_high_and_low() {
        let sim = SimClock::new(1_000_000);
        assert_eq!(sim.now(), 0);

        sim.advance_ticks(1234);
        assert_eq!(sim.now(), 1234);
    }

    #[test]
    fn test_monotonic_across_wraparound() {
        let sim = SimClock::new(1_000_000);

        let mut last = sim.now();
        // Step to just before the wrap, then across it.
        sim.advance_ticks(u32::MAX as u64 - 10);
        for _ in 0..20 {
            sim.advance_ticks(1);
            let now = sim.now();
            assert!(now >= last, "clock went backwards: {} < {}", now, last);
            last = now;
        }
    }

    #[test]
    fn test_wraparound_is_exactly_one_tick() {
        let sim = SimClock::new(1_000_000);

        sim.advance_ticks(u32::MAX as u64);
        let before = sim.now();
        assert_eq!(before, u32::MAX as u64);

        sim.advance_ticks(1);
        let after = sim.now();
        assert_eq!(after, before + 1);
        assert_eq!(after, 1u64 << 32);
    }

    #[test]
    fn test_wrap_compensation_before_handler_runs() {
        let sim = SimClock::new(1_000_000);

        // Past halfway, flag delivered.
        sim.advance_ticks(0xF000_0000);
        assert_eq!(sim.now(), 0xF000_0000);

        // Register wraps but the overflow interrupt has not run yet.
        sim.advance_raw(0x1000_0005);
        assert_eq!(sim.clock().source().read(), 5);
        assert_eq!(sim.now(), (1u64 << 32) | 5);

        // Handler catches up; value is unchanged.
        sim.clock().on_overflow();
        assert_eq!(sim.now(), (1u64 << 32) | 5);
    }

    #[test]
    fn test_no_compensation_below_halfway() {
        let sim = SimClock::new(1_000_000);

        // Flag never raised, small register is just a young counter.
        sim.advance_ticks(100);
        assert_eq!(sim.now(), 100);
    }

    #[test]
    fn test_multiple_wraps() {
        let sim = SimClock::new(1_000_000);

        let three_wraps = 3 * (1u64 << 32) + 77;
        sim.advance_ticks(three_wraps);
        assert_eq!(sim.now(), three_wraps);
    }

    #[test]
    fn test_elapsed_ticks_never_underflows() {
        assert_eq!(elapsed_ticks(10, 30), 20);
        assert_eq!(elapsed_ticks(30, 10), 0);
        assert_eq!(elapsed_ticks(5, 5), 0);
    }

    #[test]
    fn test_elapsed_micros_conversion() {
        // 3 MHz: 3 ticks per microsecond
        let sim = SimClock::new(3_000_000);
        let start = sim.now();
        sim.advance_micros(250);
        assert_eq!(sim.clock().elapsed_micros(start, sim.now()), 250);
        // Reversed arguments: defined zero, not a panic
        assert_eq!(sim.clock().elapsed_micros(sim.now(), start), 0);
    }

    #[test]
    fn test_reinit_resumes_timeline() {
        let sim = SimClock::new(1_000_000);
        sim.advance_ticks(500);

        let resumed = (7u64 << 32) | 0x9000_0000;
        sim.clock().reinit(resumed);
        assert_eq!(sim.now(), resumed);

        sim.advance_ticks(10);
        assert_eq!(sim.now(), resumed + 10);
    }

    #[test]
    fn test_reinit_restores_halfway_flag() {
        let sim = SimClock::new(1_000_000);

        // Resume in the upper half: a wrap before the handler runs must
        // still be compensated.
        sim.clock().reinit(0xFFFF_FFF0);
        sim.advance_raw(0x20);
        assert_eq!(sim.now(), (1u64 << 32) | 0x10);
    }

    #[test]
    fn test_shutdown_stops_source() {
        let sim = SimClock::new(1_000_000);
        sim.advance_ticks(42);

        sim.clock().shutdown();
        assert!(!sim.clock().source().is_running());
        assert_eq!(sim.now(), sim.clock().source().read() as u64);
    }

    #[test]
    fn test_rejects_non_mhz_frequency() {
        assert!(MonotonicClock::try_new(FakeTickSource::new(32_768)).is_err());
        assert!(MonotonicClock::try_new(FakeTickSource::new(0)).is_err());
        assert!(MonotonicClock::try_new(FakeTickSource::new(204_000_000)).is_ok());
    }

    #[test]
    #[should_panic(expected = "unsupported tick source frequency")]
    fn test_new_panics_on_bad_frequency() {
        let _ = MonotonicClock::new(FakeTickSource::new(32_768));
    }

    #[test]
    fn test_threaded_readers_stay_monotonic() {
        let sim = Arc::new(SimClock::new(1_000_000));
        // Park near the top before anyone reads, so wraps come quickly.
        sim.clock().reinit(0xFFF0_0000);

        let mut readers = Vec::new();
        for _ in 0..4 {
            let sim = Arc::clone(&sim);
            readers.push(std::thread::spawn(move || {
                let mut last = 0u64;
                for _ in 0..200_000 {
                    let now = sim.now();
                    assert!(now >= last, "clock went backwards: {} < {}", now, last);
                    last = now;
                }
            }));
        }

        // Drive the register across several wraps while readers hammer
        // now().
        for _ in 0..8 {
            sim.advance_ticks(1 << 30);
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
