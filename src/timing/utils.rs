//! # Platform Utilities (utils.rs)
//!
//! Low-level helpers shared by the clock's lock-free read path and the
//! busy-wait delay: CPU spin hints, cache alignment, and a bounded
//! exponential spin/yield helper.
//!
//! ## Platform Notes
//!
//! ```text
//!     Platform-Specific Behavior:
//!
//!     x86_64 (Intel/AMD):
//!     ├─ Cache line: 64 bytes
//!     └─ PAUSE instruction in spin loops
//!
//!     AArch64 (ARM):
//!     ├─ Cache line: 128 bytes
//!     └─ YIELD hint in spin loops
//!
//!     Generic (Fallback):
//!     ├─ Cache line: 64 bytes (assumed)
//!     └─ Standard spin loop hint
//! ```

/// Cache line size for x86_64 processors (Intel/AMD).
#[cfg(target_arch = "x86_64")]
pub(crate) const CACHE_LINE_SIZE: usize = 64;

/// Cache line size for ARM64 processors.
///
/// Many ARM designs fetch 128-byte lines; aligning to 128 avoids
/// cross-line sharing on those parts.
#[cfg(target_arch = "aarch64")]
pub(crate) const CACHE_LINE_SIZE: usize = 128;

/// Default cache line size for other architectures.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) const CACHE_LINE_SIZE: usize = 64;

/// CPU-specific relaxation hint for spin loops.
///
/// Tells the CPU the current loop iteration is a spin-wait, so it can
/// back off speculation, save power, and give a hyperthread sibling
/// room. Used by the clock's sequence-lock retry loop and by
/// [`delay_us`](crate::delay_us).
///
/// - **x86_64**: PAUSE instruction
/// - **ARM64**: YIELD via the standard spin hint
/// - **Others**: standard spin loop hint
#[inline(always)]
pub fn cpu_relax() {
    #[cfg(target_arch = "x86_64")]
    {
        #[cfg(any(target_feature = "sse2", target_feature = "sse"))]
        unsafe {
            std::arch::x86_64::_mm_pause();
        }
        #[cfg(not(any(target_feature = "sse2", target_feature = "sse")))]
        {
            std::hint::spin_loop();
        }
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        std::hint::spin_loop();
    }
}

/// Cache-aligned wrapper to keep a value on its own cache line.
///
/// The clock's writer-side state (sequence word, overflow count, halfway
/// flag) is mutated from interrupt context and read from everywhere.
/// Keeping that state on a dedicated line means a reader on another core
/// never ping-pongs a line it shares with unrelated data.
///
/// ```text
///     Without alignment:            With alignment:
///     ┌──────────────────────┐      ┌──────────────────────┐
///     │ clock state │ other  │      │     clock state      │
///     └──────────────────────┘      └──────────────────────┘
///     writes invalidate both        ┌──────────────────────┐
///                                   │        other         │
///                                   └──────────────────────┘
/// ```
#[cfg(target_arch = "aarch64")]
#[repr(C, align(128))]
pub(crate) struct CacheAligned<T>(pub T);
#[cfg(not(target_arch = "aarch64"))]
#[repr(C, align(64))]
pub(crate) struct CacheAligned<T>(pub T);

impl<T> CacheAligned<T> {
    /// Creates a new cache-aligned value.
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// Gets a reference to the inner value.
    #[inline(always)]
    pub fn get(&self) -> &T {
        &self.0
    }
}

impl<T: Default> Default for CacheAligned<T> {
    fn default() -> Self {
        Self(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CacheAligned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Exponential spin/yield helper for retry loops.
///
/// A torn sequence-lock read means the wraparound handler ran mid-read;
/// the writer's critical section is a handful of instructions, so the
/// retry nearly always succeeds immediately. When it doesn't (heavy
/// preemption on a host build), this backs off exponentially and
/// eventually yields to the scheduler instead of burning a core.
///
/// ```text
///     Attempt 1: spin 1×
///     Attempt 2: spin 2×
///     Attempt 3: spin 4×
///     Attempt 4: spin 8×
///     Attempt 5+: yield to scheduler
/// ```
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    /// Current backoff step (increases with each retry)
    step: u32,
    /// Maximum step before the caller should treat the loop as stuck
    max_step: u32,
}

impl Backoff {
    /// Creates a new backoff helper with the given maximum step.
    pub fn new(max_step: u32) -> Self {
        Self { step: 0, max_step }
    }

    /// Performs one backoff step with increasing delay.
    ///
    /// Steps 0-3 spin with [`cpu_relax`] for `2^step` iterations;
    /// later steps yield to the OS scheduler.
    #[inline]
    pub fn backoff(&mut self) {
        if self.step < 4 {
            for _ in 0..(1 << self.step) {
                cpu_relax();
            }
        } else {
            std::thread::yield_now();
        }
        self.step = (self.step + 1).min(self.max_step);
    }

    /// Checks whether the maximum backoff level has been reached.
    #[inline]
    pub fn is_at_max(&self) -> bool {
        self.step >= self.max_step
    }
}
