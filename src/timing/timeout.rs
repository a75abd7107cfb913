//! # Timeout Primitive
//!
//! A [`Timeout`] is a target tick captured at arm time; polling it is a
//! single comparison against a fresh timestamp. The struct holds all of
//! its state, so any number of timeouts can be live at once with
//! nothing shared between them: keep them on the stack, in structs,
//! wherever.
//!
//! ```text
//!     t = Timeout::after(&clock, 500)        poll ──► now() >= target?
//!                │                                        │
//!         target = now + 500µs                     false ... false, true
//! ```
//!
//! The blocking [`delay_us`] is the same primitive in a spin loop, for
//! the rare place that genuinely has nothing else to do.

use super::clock::Clock;
use super::utils::cpu_relax;

/// A stateless point-in-time: "has this instant passed yet?"
///
/// Immutable once armed. Copy it freely; every copy refers to the same
/// instant.
///
/// # Example
///
/// ```rust
/// use monotick::{SimClock, Timeout};
///
/// let sim = SimClock::new(1_000_000);
/// let timeout = Timeout::after(&sim, 1_000);
///
/// assert!(!timeout.is_done(&sim));
/// sim.advance_micros(1_000);
/// assert!(timeout.is_done(&sim));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    target_tick: u64,
}

impl Timeout {
    /// Arms a timeout `micros` microseconds from now.
    ///
    /// A zero duration produces a timeout that is already done.
    #[inline]
    pub fn after<C: Clock>(clock: &C, micros: u64) -> Self {
        Self {
            target_tick: clock.now().saturating_add(clock.micros_to_ticks(micros)),
        }
    }

    /// Checks whether the armed instant has passed.
    ///
    /// Purely a comparison against a fresh timestamp; polling has no
    /// side effects and any context that may call
    /// [`Clock::now`] may poll.
    #[inline]
    pub fn is_done<C: Clock>(&self, clock: &C) -> bool {
        clock.now() >= self.target_tick
    }

    /// The absolute tick this timeout is armed for.
    #[inline]
    pub fn target_tick(&self) -> u64 {
        self.target_tick
    }
}

/// Blocks for `micros` microseconds by spinning on a [`Timeout`].
///
/// Precise as long as the tick frequency holds. Prefer arming a
/// [`Timeout`] and polling it from the main loop; spin-blocking is for
/// bring-up code and tight bit-bang sequences.
pub fn delay_us<C: Clock>(clock: &C, micros: u64) {
    let timeout = Timeout::after(clock, micros);
    while !timeout.is_done(clock) {
        cpu_relax();
    }
}

/// Blocks for roughly `micros` microseconds by counting instructions.
///
/// Needs no timer at all, which is its only virtue: accuracy depends on
/// the CPU frequency being exactly `cpu_freq_hz` and on the loop not
/// being interrupted. Only intended for before the tick source is up.
#[deprecated(note = "use delay_us with a running clock instead")]
pub fn delay_loop_us(cpu_freq_hz: u32, micros: u32) {
    let iterations = (cpu_freq_hz as u64 / 1_000_000).saturating_mul(micros as u64);
    for _ in 0..iterations {
        std::hint::spin_loop();
    }
}
