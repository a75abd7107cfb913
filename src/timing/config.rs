//! # Limiter Configuration
//!
//! Settings structs for the two admission-control policies, with the
//! validation rules applied when a limiter is constructed.
//!
//! ## Token Bucket Parameters
//!
//! ```text
//!     TokenBucketConfig:
//!
//!     ┌──────────────────────────────┐
//!     │   burst_capacity             │ ← instantaneous ceiling
//!     │   ┌─────────────────────┐    │
//!     │   │ available tokens    │    │
//!     │   └─────────────────────┘    │
//!     │                              │
//!     │   rate: 10 tokens            │ ← accrued continuously
//!     │   interval_us: 1_000_000     │ ← per this much time
//!     └──────────────────────────────┘
//! ```
//!
//! ## Backoff Parameters
//!
//! ```text
//!     BackoffConfig:
//!
//!     min_delay_us ◄───── halved when a pressure window stays quiet
//!          │
//!     current delay       (one grant per delay)
//!          │
//!     max_delay_us ◄───── doubled after `pressure_threshold` pressured
//!                         windows
//! ```

/// Settings for a [`TokenBucket`](crate::TokenBucket).
///
/// Tokens accrue continuously: `rate` tokens spread evenly over every
/// `interval_us` microseconds, capped at `burst_capacity`. Admitting `n`
/// events costs `n` whole tokens.
///
/// # Examples
///
/// ```rust
/// use monotick::TokenBucketConfig;
///
/// // One event every 10 seconds sustained, bursts of up to 4.
/// let config = TokenBucketConfig::new(1, 10_000_000, 4);
/// assert!(config.validate().is_ok());
///
/// // 100 events/second sustained, bursts of up to 200.
/// let config = TokenBucketConfig::per_second(100).with_burst_multiplier(2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucketConfig {
    /// Tokens added per interval.
    ///
    /// Together with `interval_us` this sets the sustained rate. The
    /// accrual is continuous, not a step once per interval: after half
    /// an interval, half of `rate` has accrued.
    pub rate: u32,

    /// Length of one replenishment interval in microseconds.
    pub interval_us: u64,

    /// Maximum whole tokens the bucket can hold.
    ///
    /// This is the burst ceiling: the largest number of events that can
    /// be admitted instantaneously with no prior waiting.
    pub burst_capacity: u32,
}

impl Default for TokenBucketConfig {
    /// 10 tokens per second sustained, bursts of up to 50.
    fn default() -> Self {
        Self {
            rate: 10,
            interval_us: 1_000_000,
            burst_capacity: 50,
        }
    }
}

impl TokenBucketConfig {
    /// Creates a configuration with explicit parameters.
    pub fn new(rate: u32, interval_us: u64, burst_capacity: u32) -> Self {
        Self {
            rate,
            interval_us,
            burst_capacity,
        }
    }

    /// Per-second rate limiting with a 2x burst ceiling.
    ///
    /// # Example
    ///
    /// ```rust
    /// use monotick::TokenBucketConfig;
    ///
    /// let config = TokenBucketConfig::per_second(100);
    /// assert_eq!(config.burst_capacity, 200);
    /// ```
    pub fn per_second(events_per_second: u32) -> Self {
        Self {
            rate: events_per_second,
            interval_us: 1_000_000,
            burst_capacity: events_per_second.saturating_mul(2),
        }
    }

    /// Sets the burst ceiling as a multiple of the rate.
    pub fn with_burst_multiplier(mut self, multiplier: u32) -> Self {
        self.burst_capacity = self.rate.saturating_mul(multiplier);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message if:
    /// - `rate` is 0 (the bucket would never replenish)
    /// - `interval_us` is 0
    /// - `burst_capacity` is 0 (nothing could ever be admitted)
    /// - `rate` exceeds `burst_capacity`
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.rate == 0 {
            return Err("rate must be greater than 0");
        }
        if self.interval_us == 0 {
            return Err("interval_us must be greater than 0");
        }
        if self.burst_capacity == 0 {
            return Err("burst_capacity must be greater than 0");
        }
        if self.rate > self.burst_capacity {
            return Err("rate should not exceed burst_capacity");
        }
        Ok(())
    }

    /// Effective sustained rate in events per second.
    pub fn effective_rate_per_second(&self) -> f64 {
        if self.interval_us == 0 {
            0.0
        } else {
            (self.rate as f64 * 1_000_000.0) / self.interval_us as f64
        }
    }
}

/// Settings for a [`BackoffLimiter`](crate::BackoffLimiter).
///
/// The limiter grants one request per cooldown and adapts the cooldown:
/// a window that saw pressure counts toward doubling, a quiet window
/// halves, and the result is clamped to `[min_delay_us, max_delay_us]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Shortest allowed cooldown in microseconds. Must be non-zero:
    /// doubling a zero delay goes nowhere, so the limiter could never
    /// back off.
    pub min_delay_us: u64,

    /// Longest allowed cooldown in microseconds.
    pub max_delay_us: u64,

    /// Length of the pressure observation window in microseconds,
    /// armed at every grant.
    pub pressure_window_us: u64,

    /// Number of pressured windows required before the cooldown doubles.
    pub pressure_threshold: u32,
}

impl BackoffConfig {
    /// Creates a configuration with explicit parameters.
    pub fn new(
        min_delay_us: u64,
        max_delay_us: u64,
        pressure_window_us: u64,
        pressure_threshold: u32,
    ) -> Self {
        Self {
            min_delay_us,
            max_delay_us,
            pressure_window_us,
            pressure_threshold,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message if:
    /// - `min_delay_us` is 0
    /// - `max_delay_us` is smaller than `min_delay_us`
    /// - `pressure_threshold` is 0
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.min_delay_us == 0 {
            return Err("min_delay_us must be greater than 0");
        }
        if self.max_delay_us < self.min_delay_us {
            return Err("max_delay_us must not be smaller than min_delay_us");
        }
        if self.pressure_threshold == 0 {
            return Err("pressure_threshold must be greater than 0");
        }
        Ok(())
    }
}
