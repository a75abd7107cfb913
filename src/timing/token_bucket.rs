//! # Token Bucket Limiter
//!
//! All-or-nothing admission control: "may these `n` events proceed
//! right now?" Capacity accrues continuously from elapsed ticks and is
//! debited per admitted event.
//!
//! ```text
//!     Replenishment, continuously:
//!
//!     elapsed ticks × rate ──► fractional accumulator
//!                                      │
//!                     every interval_ticks worth folds into
//!                                      ▼
//!                          whole tokens (≤ burst_capacity)
//! ```
//!
//! ## Why the fractional accumulator
//!
//! Replenishing in whole tokens once per interval would make the
//! admitted rate depend on *when* the limiter is polled: poll just
//! before the interval boundary and the partial interval is lost.
//! Instead, elapsed ticks are scaled by `rate` and banked exactly; only
//! full-interval multiples convert to spendable tokens, and the
//! remainder carries forward untouched. Draining one event at a time
//! and draining in big batches at irregular intervals admit the same
//! totals over any horizon, with no float and no rounding drift.
//!
//! The one place accrual is discarded is the burst ceiling: once whole
//! tokens saturate at `burst_capacity`, further accrual (including the
//! banked fraction) is dropped rather than stored. That is what makes
//! the ceiling hard.

use tracing::{debug, trace};

use super::clock::{elapsed_ticks, Clock};
use super::config::TokenBucketConfig;

/// Token-bucket admission policy over an injected [`Clock`].
///
/// Single-writer: the owning task calls [`allowed`](TokenBucket::allowed)
/// and [`available`](TokenBucket::available); the methods take
/// `&mut self` and the type makes no interior-mutability promises. Do
/// not share one instance with an interrupt handler; arbitrate at a
/// higher level instead.
///
/// # Example
///
/// ```rust
/// use monotick::{SimClock, TokenBucket, TokenBucketConfig};
///
/// let sim = SimClock::new(1_000_000);
/// // 1 event per 10 seconds sustained, bursts of 4.
/// let mut bucket = TokenBucket::new(&sim, TokenBucketConfig::new(1, 10_000_000, 4));
///
/// assert!(bucket.allowed(4));       // full burst, spent at once
/// assert!(!bucket.allowed(1));      // empty
/// sim.advance_micros(10_000_000);
/// assert!(bucket.allowed(1));       // one interval, one token
/// ```
#[derive(Debug)]
pub struct TokenBucket<C> {
    clock: C,

    // Settings
    rate: u32,
    interval_ticks: u64,
    capacity: u32,

    // State
    tokens: u32,
    fractional_ticks: u64,
    last_update_tick: u64,
}

impl<C: Clock> TokenBucket<C> {
    /// Creates a bucket starting full (a cold start may burst).
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid (see
    /// [`TokenBucketConfig::validate`]).
    pub fn new(clock: C, config: TokenBucketConfig) -> Self {
        config
            .validate()
            .expect("invalid token bucket configuration");

        let interval_ticks = clock.micros_to_ticks(config.interval_us);
        let last_update_tick = clock.now();
        Self {
            clock,
            rate: config.rate,
            interval_ticks,
            capacity: config.burst_capacity,
            tokens: config.burst_capacity,
            fractional_ticks: 0,
            last_update_tick,
        }
    }

    /// Requests admission for `events` units, all or nothing.
    ///
    /// Replenishment is applied first, so the decision always reflects
    /// the current instant. On `true` all `events` tokens are debited;
    /// on `false` nothing changes - a denied request costs nothing and
    /// does not disturb the banked fraction.
    ///
    /// Requesting 0 events always succeeds.
    pub fn allowed(&mut self, events: u32) -> bool {
        self.replenish();

        if events <= self.tokens {
            self.tokens -= events;
            true
        } else {
            trace!(events, available = self.tokens, "token bucket denial");
            false
        }
    }

    /// Whole tokens available right now, after replenishment.
    pub fn available(&mut self) -> u32 {
        self.replenish();
        self.tokens
    }

    /// The configured burst ceiling.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Banks the ticks elapsed since the last update and folds full
    /// intervals into whole tokens.
    ///
    /// Always advances `last_update_tick`, whether or not the caller's
    /// request ends up admitted: elapsed time must be counted exactly
    /// once.
    fn replenish(&mut self) {
        let now = self.clock.now();
        let elapsed = elapsed_ticks(self.last_update_tick, now);
        self.last_update_tick = now;
        if elapsed == 0 {
            return;
        }

        self.fractional_ticks = self
            .fractional_ticks
            .saturating_add(elapsed.saturating_mul(self.rate as u64));

        if self.fractional_ticks >= self.interval_ticks {
            let folded = self.fractional_ticks / self.interval_ticks;
            self.fractional_ticks %= self.interval_ticks;

            let total = (self.tokens as u64).saturating_add(folded);
            if total >= self.capacity as u64 {
                // Hard burst ceiling: drop the excess, fraction included.
                self.tokens = self.capacity;
                self.fractional_ticks = 0;
            } else {
                self.tokens = total as u32;
            }
            debug!(folded, available = self.tokens, "token bucket replenished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::sim::SimClock;

    fn bucket(sim: &SimClock, rate: u32, interval_us: u64, burst: u32) -> TokenBucket<&SimClock> {
        TokenBucket::new(sim, TokenBucketConfig::new(rate, interval_us, burst))
    }

    #[test]
    fn test_burst_ceiling() {
        let sim = SimClock::new(1_000_000);
        let mut limit = bucket(&sim, 1, 10_000_000, 4);

        assert!(!limit.allowed(5));
        assert!(limit.allowed(4));
        assert!(!limit.allowed(1));
    }

    #[test]
    fn test_one_event_per_interval() {
        let sim = SimClock::new(1_000_000);
        let mut limit = bucket(&sim, 1, 10_000_000, 4);

        assert!(limit.allowed(4));
        assert!(!limit.allowed(1));

        sim.advance_micros(10_000_000);
        assert!(limit.allowed(1));
        assert!(!limit.allowed(1));

        sim.advance_micros(10_000_000);
        assert!(limit.allowed(1));
        assert!(!limit.allowed(1));
    }

    #[test]
    fn test_burst_limited_after_long_idle() {
        let sim = SimClock::new(1_000_000);
        let mut limit = bucket(&sim, 1, 10_000_000, 4);

        assert!(limit.allowed(4));
        assert!(!limit.allowed(1));

        // 1000 seconds bank 100 tokens worth, the ceiling keeps 4.
        sim.advance_micros(1_000_000_000);
        assert!(limit.allowed(1));
        assert!(!limit.allowed(4));
    }

    #[test]
    fn test_non_zero_start_time() {
        let sim = SimClock::new(1_000_000);
        sim.advance_micros(400_000_000);
        let mut limit = bucket(&sim, 1, 10_000_000, 4);

        assert!(limit.allowed(2));
        sim.advance_micros(40_000_000);
        assert!(!limit.allowed(5));
        assert!(limit.allowed(4));
        assert!(!limit.allowed(1));
    }

    #[test]
    fn test_irregular_polling_rounds_exactly() {
        let sim = SimClock::new(1_000_000);
        let mut limit = bucket(&sim, 1, 10_000_000, 4);

        assert!(limit.allowed(4));
        assert!(!limit.allowed(1));

        sim.advance_micros(9_000_000);
        sim.advance_micros(9_000_000);
        // t = 18s: one whole token, 8s banked
        assert!(!limit.allowed(2));
        sim.advance_micros(2_000_010);
        // t = 20.00001s: exactly two tokens
        assert!(!limit.allowed(3));
        assert!(limit.allowed(2));
    }

    #[test]
    fn test_multiple_tokens_per_interval() {
        let sim = SimClock::new(1_000_000);
        let mut limit = bucket(&sim, 3, 5_000_000, 10);

        assert!(limit.allowed(10));
        assert!(!limit.allowed(1));

        sim.advance_micros(4_000_000);
        assert!(!limit.allowed(1));

        sim.advance_micros(1_000_000);
        // One full interval passed, 3 tokens per interval.
        assert!(limit.allowed(3));
        assert!(!limit.allowed(1));
    }

    #[test]
    fn test_multiple_tokens_per_interval_one_by_one() {
        let sim = SimClock::new(1_000_000);
        let mut limit = bucket(&sim, 3, 5_000_000, 10);

        assert!(limit.allowed(10));
        assert!(!limit.allowed(1));

        sim.advance_micros(4_000_000);
        assert!(!limit.allowed(1));

        sim.advance_micros(1_000_000);
        assert!(limit.allowed(1));
        assert!(limit.allowed(1));
        assert!(limit.allowed(1));
        assert!(!limit.allowed(1));

        sim.advance_micros(4_999_999);
        assert_eq!(limit.available(), 0);
        assert!(!limit.allowed(1));

        sim.advance_micros(1);
        // The missing microsecond completes the interval.
        assert_eq!(limit.available(), 3);
        assert!(!limit.allowed(4));
        assert!(limit.allowed(2));
        assert!(limit.allowed(1));
        assert!(!limit.allowed(1));
    }

    #[test]
    fn test_denied_request_costs_nothing() {
        let sim = SimClock::new(1_000_000);
        let mut limit = bucket(&sim, 1, 10_000_000, 4);

        assert!(limit.allowed(3));
        assert!(!limit.allowed(2));
        assert!(!limit.allowed(2));
        assert!(limit.allowed(1));
    }

    #[test]
    fn test_zero_events_always_allowed() {
        let sim = SimClock::new(1_000_000);
        let mut limit = bucket(&sim, 1, 10_000_000, 4);

        assert!(limit.allowed(4));
        assert!(limit.allowed(0));
        assert_eq!(limit.available(), 0);
    }

    #[test]
    fn test_no_drift_between_polling_patterns() {
        let sim_steady = SimClock::new(1_000_000);
        let sim_batch = SimClock::new(1_000_000);
        let mut steady = bucket(&sim_steady, 7, 1_000_000, 100);
        let mut batch = bucket(&sim_batch, 7, 1_000_000, 100);

        // Start both empty.
        assert!(steady.allowed(100));
        assert!(batch.allowed(100));

        // Same horizon: 1000 irregular steps vs one big jump, staying
        // under the ceiling so nothing is clamped away.
        let step_us = 12_345;
        let mut admitted_steady = 0u32;
        for _ in 0..1_000 {
            sim_steady.advance_micros(step_us);
            while steady.allowed(1) {
                admitted_steady += 1;
            }
        }

        sim_batch.advance_micros(step_us * 1_000);
        let mut admitted_batch = 0u32;
        while batch.allowed(1) {
            admitted_batch += 1;
        }

        // 12.345s at 7 tokens/s is 86.415 tokens: both admit 86.
        assert_eq!(admitted_steady, 86);
        assert_eq!(admitted_batch, admitted_steady);
    }

    #[test]
    fn test_works_at_higher_tick_frequency() {
        // 3 MHz source: intervals are 3x the ticks, same microsecond
        // behavior.
        let sim = SimClock::new(3_000_000);
        let mut limit = bucket(&sim, 1, 10_000_000, 4);

        assert!(limit.allowed(4));
        sim.advance_micros(9_999_999);
        assert_eq!(limit.available(), 0);
        sim.advance_micros(1);
        assert_eq!(limit.available(), 1);
    }

    #[test]
    #[should_panic(expected = "invalid token bucket configuration")]
    fn test_invalid_config_panics() {
        let sim = SimClock::new(1_000_000);
        let _ = bucket(&sim, 0, 10_000_000, 4);
    }
}
