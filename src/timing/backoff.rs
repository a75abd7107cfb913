//! # Backoff Rate Limiter
//!
//! An adaptive cooldown controller: exactly one request is granted per
//! cooldown period, and the cooldown itself is the controlled variable.
//! Sustained pressure backs the delay off multiplicatively; sustained
//! quiet recovers it.
//!
//! ```text
//!     grant ──► arm cooldown (current delay)
//!           └─► arm pressure window
//!
//!     attempt during cooldown ──► denied, window marked "pressured"
//!
//!     at next grant:
//!       window pressured?  ── yes ──► count it; threshold reached?
//!       │                              └─ yes ──► delay ×2
//!       └───────────────── no ───► delay ÷2
//!                                   (always clamped to [min, max])
//! ```
//!
//! Unlike the [`TokenBucket`](crate::TokenBucket), this does no token
//! accounting at all; it is the right policy when the goal is "service
//! a retrying caller, but slower the harder it hammers".

use tracing::{debug, trace};

use super::clock::Clock;
use super::config::BackoffConfig;
use super::timeout::Timeout;

/// Adaptive cooldown admission policy over an injected [`Clock`].
///
/// Single-writer like the token bucket: methods take `&mut self`, the
/// caller serializes access.
///
/// The very first call after construction is granted immediately at the
/// minimum delay: both internal timeouts start expired, and the
/// un-pressured path halves-then-clamps the initial `min_delay_us`.
///
/// # Example
///
/// ```rust
/// use monotick::{BackoffConfig, BackoffLimiter, SimClock};
///
/// let sim = SimClock::new(1_000_000);
/// let mut limiter = BackoffLimiter::new(
///     &sim,
///     BackoffConfig::new(1_000, 64_000, 5_000, 2),
/// );
///
/// assert!(limiter.allowed());       // first call: automatic grant
/// assert!(!limiter.allowed());      // inside the cooldown
/// sim.advance_micros(1_000);
/// assert!(limiter.allowed());
/// ```
#[derive(Debug)]
pub struct BackoffLimiter<C> {
    clock: C,

    // Settings
    min_delay_us: u64,
    max_delay_us: u64,
    pressure_window_us: u64,
    pressure_threshold: u32,

    // State
    current_delay_us: u64,
    pressured: bool,
    pressure_count: u32,
    next_allowed: Timeout,
    window: Timeout,
}

impl<C: Clock> BackoffLimiter<C> {
    /// Creates a limiter idling at the minimum delay.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid (see
    /// [`BackoffConfig::validate`]).
    pub fn new(clock: C, config: BackoffConfig) -> Self {
        config.validate().expect("invalid backoff configuration");

        // Zero-length timeouts: already expired, so the first request
        // is granted and no window counts as pressured.
        let next_allowed = Timeout::after(&clock, 0);
        let window = Timeout::after(&clock, 0);
        Self {
            clock,
            min_delay_us: config.min_delay_us,
            max_delay_us: config.max_delay_us,
            pressure_window_us: config.pressure_window_us,
            pressure_threshold: config.pressure_threshold,
            current_delay_us: config.min_delay_us,
            pressured: false,
            pressure_count: 0,
            next_allowed,
            window,
        }
    }

    /// Requests admission for one event.
    ///
    /// Denied while the cooldown runs (denials during the pressure
    /// window mark it pressured). On the grant the delay is adapted:
    /// `pressure_threshold` pressured windows double it, a quiet window
    /// halves it, and it is clamped to the configured bounds before the
    /// next cooldown is armed.
    pub fn allowed(&mut self) -> bool {
        if !self.window.is_done(&self.clock) {
            // Someone is knocking inside the observation window; the
            // grant path turns this into pressure bookkeeping.
            self.pressured = true;
        }

        if !self.next_allowed.is_done(&self.clock) {
            trace!("backoff denial, cooldown still running");
            return false;
        }

        let mut delay = self.current_delay_us;
        if self.pressured {
            self.pressured = false;
            self.pressure_count += 1;
            if self.pressure_count >= self.pressure_threshold {
                self.pressure_count = 0;
                delay = delay.saturating_mul(2);
            }
        } else {
            delay /= 2;
        }
        delay = delay.clamp(self.min_delay_us, self.max_delay_us);

        if delay != self.current_delay_us {
            debug!(
                from_us = self.current_delay_us,
                to_us = delay,
                "backoff delay adapted"
            );
            self.current_delay_us = delay;
        }

        self.next_allowed = Timeout::after(&self.clock, self.current_delay_us);
        self.window = Timeout::after(&self.clock, self.pressure_window_us);
        true
    }

    /// The cooldown currently being applied, in microseconds.
    pub fn current_delay_us(&self) -> u64 {
        self.current_delay_us
    }
}
