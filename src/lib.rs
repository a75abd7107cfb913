//! # Monotick - Wraparound-Safe Timing for Embedded Firmware
//!
//! The timing foundation of an embedded application: a free-running
//! 32-bit hardware counter extended into a 64-bit monotonic clock that
//! never goes backwards, and the rate-limiting policies that consume it.
//! Everything runs unmodified on the host under simulated time, so the
//! numerically subtle parts are tested without hardware and without
//! sleeps.
//!
//! ## Why a 32-bit counter is not enough
//!
//! ```text
//!     A 1 MHz 32-bit counter wraps every ~71 minutes:
//!
//!     ... 0xFFFFFFFE, 0xFFFFFFFF, 0x00000000, 0x00000001 ...
//!                                 ▲
//!                     every "later than" comparison
//!                     breaks right here
//! ```
//!
//! `monotick` tracks wraparounds in software and hands out a 64-bit
//! tick count that is safe to compare, subtract, and stash for later -
//! readable lock-free from normal code, interrupt handlers, and a
//! second core sharing the same timer.
//!
//! ## Features
//!
//! - 🔒 **Lock-free reads** - `now()` is a sequence-lock read that
//!   never blocks and is safe in interrupt context
//! - 🌀 **Wraparound-safe** - a wrap costs exactly one tick, never
//!   `2^32 - 1` of them
//! - 🪣 **Token bucket limiter** - continuous fractional replenishment
//!   with zero long-run drift
//! - 📉 **Backoff limiter** - exponential cooldown under pressure,
//!   recovery when idle
//! - ⏱️ **Timeouts and profiling** - stateless deadline polling and
//!   O(1) call-cost counters
//! - 🧪 **Deterministic testing** - a simulated tick source drives the
//!   whole stack through wraps, bursts, and hours of virtual time
//!
//! ## Quick Start
//!
//! ```rust
//! use monotick::{SimClock, TokenBucket, TokenBucketConfig};
//!
//! // On hardware this would wrap a timer peripheral via `TickSource`;
//! // here the simulated source stands in.
//! let clock = SimClock::new(1_000_000); // 1 MHz
//!
//! // Allow 100 events/second sustained, bursts of up to 200.
//! let mut bucket = TokenBucket::new(&clock, TokenBucketConfig::per_second(100));
//!
//! if bucket.allowed(1) {
//!     // proceed with the event
//! }
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                   ┌─────────────────────────┐
//!                   │    Your Firmware        │
//!                   └───────────┬─────────────┘
//!                               │
//!                   ┌───────────▼─────────────┐
//!                   │      Timing API         │
//!                   ├─────────────────────────┤
//!                   │  • now()                │
//!                   │  • Timeout::is_done()   │
//!                   │  • TokenBucket::allowed │
//!                   │  • BackoffLimiter       │
//!                   └───────────┬─────────────┘
//!                               │
//!               ┌───────────────┴───────────────┐
//!               │                               │
//!    ┌──────────▼──────────┐        ┌───────────▼──────────┐
//!    │   MonotonicClock    │        │     TickSource       │
//!    ├─────────────────────┤        ├──────────────────────┤
//!    │ • Sequence lock     │  ◄───  │ • Timer peripheral   │
//!    │ • Overflow tracking │        │ • or FakeTickSource  │
//!    │ • Halfway heuristic │        │   (host/sim)         │
//!    └─────────────────────┘        └──────────────────────┘
//! ```
//!
//! ## Execution Contexts
//!
//! | Operation | Context |
//! |-----------|---------|
//! | `MonotonicClock::now` | any, including interrupts and other cores |
//! | `on_halfway` / `on_overflow` / `reinit` / `shutdown` | timer owner only |
//! | `TokenBucket` / `BackoffLimiter` / `IntervalSet` | one owning task (`&mut self`) |
//! | `ProfileRegistry` | any |
//!
//! The limiters deliberately take `&mut self`: they are plain
//! single-owner state machines, and callers that need sharing wrap them
//! at a higher level. Only the clock itself pays for cross-context
//! synchronization.
//!
//! ## Units
//!
//! Public durations are microseconds (`_us`). Timestamps are ticks at
//! the source frequency; the frequency must be a whole number of MHz so
//! the conversion is exact, which is checked at construction.
//!
//! ## Safety
//!
//! This crate uses `unsafe` code only for the x86_64 PAUSE spin hint.

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_op_in_unsafe_fn)]

// Internal module
mod timing;

// Public re-exports
#[allow(deprecated)]
pub use timing::{
    cpu_relax, delay_loop_us, delay_us, elapsed_ticks, BackoffConfig, BackoffLimiter, Clock,
    FakeTickSource, IntervalSet, MonotonicClock, Profile, ProfileRegistry, ProfileSnapshot,
    SimClock, TickSource, Timeout, TokenBucket, TokenBucketConfig, MAX_INTERVALS, MAX_PROFILES,
};

/// A clock wrapped in `Arc` for sharing across tasks and handlers.
///
/// # Example
/// ```rust
/// use monotick::{FakeTickSource, MonotonicClock, SharedClock};
/// use std::sync::Arc;
///
/// let clock: SharedClock<FakeTickSource> =
///     Arc::new(MonotonicClock::new(FakeTickSource::new(1_000_000)));
///
/// let for_worker = Arc::clone(&clock);
/// std::thread::spawn(move || {
///     let _ = for_worker.now();
/// });
/// ```
pub type SharedClock<S> = std::sync::Arc<MonotonicClock<S>>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use monotick::prelude::*;
///
/// let clock = SimClock::new(1_000_000);
/// let mut bucket = TokenBucket::new(&clock, TokenBucketConfig::per_second(10));
/// assert!(bucket.allowed(1));
/// ```
pub mod prelude {
    //! Common imports for typical timing and rate-limiting use.

    pub use crate::{
        BackoffConfig, BackoffLimiter, Clock, FakeTickSource, IntervalSet, MonotonicClock,
        ProfileRegistry, SharedClock, SimClock, TickSource, Timeout, TokenBucket,
        TokenBucketConfig,
    };
}

/// Builder for [`TokenBucket`] configuration.
///
/// A fluent alternative to filling in [`TokenBucketConfig`] by hand,
/// with a `try_` variant for callers that prefer an error over a panic.
///
/// # Example
///
/// ```rust
/// use monotick::{SimClock, TokenBucketBuilder};
///
/// let clock = SimClock::new(1_000_000);
/// let mut bucket = TokenBucketBuilder::new()
///     .rate(100)                 // tokens per interval
///     .interval_us(1_000_000)    // one second
///     .burst_capacity(400)       // instantaneous ceiling
///     .build(&clock);
///
/// assert!(bucket.allowed(400));
///
/// // Invalid settings surface as an Err instead of a panic:
/// let result = TokenBucketBuilder::new().rate(0).try_build(&clock);
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TokenBucketBuilder {
    config: TokenBucketConfig,
}

impl TokenBucketBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tokens added per interval.
    pub fn rate(mut self, rate: u32) -> Self {
        self.config.rate = rate;
        self
    }

    /// Sets the replenishment interval in microseconds.
    pub fn interval_us(mut self, interval_us: u64) -> Self {
        self.config.interval_us = interval_us;
        self
    }

    /// Sets the burst ceiling.
    pub fn burst_capacity(mut self, capacity: u32) -> Self {
        self.config.burst_capacity = capacity;
        self
    }

    /// Builds the bucket against the given clock.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; use
    /// [`try_build`](TokenBucketBuilder::try_build) to handle the error
    /// instead.
    pub fn build<C: Clock>(self, clock: C) -> TokenBucket<C> {
        TokenBucket::new(clock, self.config)
    }

    /// Builds the bucket, returning an error for invalid settings.
    ///
    /// # Errors
    ///
    /// Returns the validation error message.
    pub fn try_build<C: Clock>(self, clock: C) -> Result<TokenBucket<C>, &'static str> {
        self.config.validate()?;
        Ok(TokenBucket::new(clock, self.config))
    }
}
