//! # Call-Duration Profiling
//!
//! Cheap per-site counters for answering "how long does this call take
//! on average, and how often does it run" without a trace buffer: each
//! [`Profile`] keeps a call count and a running-average tick cost,
//! updated in O(1) at the end of every measured call.
//!
//! ```text
//!     Profile lifecycle:
//!
//!     registry.register("uart_flush")
//!            │
//!            ▼
//!     profile.begin(&clock) ─── measured code ──► profile.end(&clock)
//!                                                     │
//!                               call_count += 1, avg folds in the
//!                               new duration
//! ```
//!
//! A process-wide [`ProfileRegistry`] hands out the profiles by label
//! and renders a report over all of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::clock::{elapsed_ticks, Clock};

/// Default maximum number of registered profiles.
pub const MAX_PROFILES: usize = 10;

/// Running-average duration counter for one call site.
///
/// The average uses the integer running-mean update
/// `avg -= avg / count; avg += duration / count`, which needs no
/// division-free trickery and never overflows, at the cost of a small
/// integer-truncation bias on strongly varying durations.
///
/// `begin`/`end` pairs are expected from one owner at a time; the
/// fields are atomic so the type can sit in a shared registry, not to
/// license concurrent measurement of the same profile.
#[derive(Debug)]
pub struct Profile {
    label: &'static str,
    call_count: AtomicU64,
    avg_ticks: AtomicU64,
    started_at: AtomicU64,
}

impl Profile {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            call_count: AtomicU64::new(0),
            avg_ticks: AtomicU64::new(0),
            started_at: AtomicU64::new(0),
        }
    }

    /// The label this profile was registered under.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Marks the start of a measured call.
    #[inline]
    pub fn begin<C: Clock>(&self, clock: &C) {
        self.started_at.store(clock.now(), Ordering::Relaxed);
    }

    /// Marks the end of a measured call and folds the duration into
    /// the running average.
    pub fn end<C: Clock>(&self, clock: &C) {
        let duration = elapsed_ticks(self.started_at.load(Ordering::Relaxed), clock.now());

        let count = self.call_count.load(Ordering::Relaxed) + 1;
        self.call_count.store(count, Ordering::Relaxed);

        let avg = self.avg_ticks.load(Ordering::Relaxed);
        let avg = avg - avg / count + duration / count;
        self.avg_ticks.store(avg, Ordering::Relaxed);
    }

    /// Clears the counters (the label stays).
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::Relaxed);
        self.avg_ticks.store(0, Ordering::Relaxed);
    }

    /// A point-in-time copy of the counters.
    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            label: self.label,
            call_count: self.call_count.load(Ordering::Relaxed),
            avg_ticks: self.avg_ticks.load(Ordering::Relaxed),
        }
    }
}

/// Copied counters of one [`Profile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    /// Registration label.
    pub label: &'static str,
    /// Number of completed `begin`/`end` pairs.
    pub call_count: u64,
    /// Running-average duration in ticks.
    pub avg_ticks: u64,
}

/// Capacity-bounded registry of named profiles.
///
/// Concurrent: registration and lookup can happen from any thread. The
/// bound exists for the same reason the C profile table was a fixed
/// array: profiling must never become an unbounded memory sink, and a
/// full registry is reported at registration time, not at use time.
///
/// # Example
///
/// ```rust
/// use monotick::{ProfileRegistry, SimClock};
///
/// let sim = SimClock::new(1_000_000);
/// let registry = ProfileRegistry::new();
///
/// let profile = registry.register("sensor_read").unwrap();
/// profile.begin(&sim);
/// sim.advance_micros(250);
/// profile.end(&sim);
///
/// assert_eq!(registry.get("sensor_read").unwrap().snapshot().avg_ticks, 250);
/// ```
#[derive(Debug)]
pub struct ProfileRegistry {
    profiles: DashMap<&'static str, Arc<Profile>, ahash::RandomState>,
    capacity: usize,
}

impl ProfileRegistry {
    /// Creates a registry with the default capacity ([`MAX_PROFILES`]).
    pub fn new() -> Self {
        Self::with_capacity(MAX_PROFILES)
    }

    /// Creates a registry holding at most `capacity` profiles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            profiles: DashMap::with_capacity_and_hasher(capacity, ahash::RandomState::new()),
            capacity,
        }
    }

    /// Registers (or retrieves) the profile for `label`.
    ///
    /// Returns `None` when the registry is full and the label is new.
    pub fn register(&self, label: &'static str) -> Option<Arc<Profile>> {
        if let Some(existing) = self.profiles.get(label) {
            return Some(existing.clone());
        }

        match self.profiles.entry(label) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => Some(occupied.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                if self.profiles.len() >= self.capacity {
                    warn!(label, "profile registry full, registration rejected");
                    return None;
                }
                let profile = Arc::new(Profile::new(label));
                vacant.insert(profile.clone());
                debug!(label, "profile registered");
                Some(profile)
            }
        }
    }

    /// Looks up an already registered profile.
    pub fn get(&self, label: &'static str) -> Option<Arc<Profile>> {
        self.profiles.get(label).map(|entry| entry.clone())
    }

    /// Number of registered profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no profiles are registered.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Snapshots every profile, sorted by label for stable output.
    pub fn snapshot(&self) -> Vec<ProfileSnapshot> {
        let mut snapshots: Vec<ProfileSnapshot> = self
            .profiles
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.label);
        snapshots
    }

    /// Renders a human-readable report over all profiles.
    ///
    /// # Example Output
    ///
    /// ```text
    /// Profiles (2/10):
    /// ├─ sensor_read: 120 calls, avg 250 ticks
    /// └─ uart_flush: 3 calls, avg 1800 ticks
    /// ```
    pub fn report(&self) -> String {
        let snapshots = self.snapshot();
        let mut out = format!("Profiles ({}/{}):", snapshots.len(), self.capacity);
        for (index, snapshot) in snapshots.iter().enumerate() {
            let branch = if index + 1 == snapshots.len() {
                "└─"
            } else {
                "├─"
            };
            out.push_str(&format!(
                "\n{} {}: {} calls, avg {} ticks",
                branch, snapshot.label, snapshot.call_count, snapshot.avg_ticks
            ));
        }
        out
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}
