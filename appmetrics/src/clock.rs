//! Clock and identity services injected into the buffer and its strategies.
//!
//! These are the only inputs to the pipeline that are not pure data: a
//! monotonic elapsed-tick source, a wall-clock source, and a unique-id
//! generator. All three are traits so tests can drive time and identity
//! deterministically (see [`testing`] when the `testing` feature is
//! enabled).

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// A source of monotonically increasing elapsed ticks.
///
/// Implementations must not assume any particular `frequency`; the pipeline
/// derives wall-clock timestamps from `elapsed_ticks() / frequency()`.
pub trait MonotonicClock: Send + Sync {
    /// Ticks elapsed since the clock was last [`reset`](MonotonicClock::reset).
    fn elapsed_ticks(&self) -> i64;

    /// Ticks per second. Must be constant for the lifetime of the clock.
    fn frequency(&self) -> i64;

    /// Resets the elapsed-tick counter to zero.
    fn reset(&self);
}

/// A source of wall-clock UTC timestamps.
pub trait WallClock: Send + Sync {
    /// Returns the current UTC time.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// A generator of unique identifiers, used only in interleaved interval mode.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh, globally unique id.
    fn new_id(&self) -> u128;
}

/// The default [`MonotonicClock`], backed by [`std::time::Instant`].
///
/// Reports a frequency of one billion ticks per second (nanosecond
/// resolution), same as `Instant`'s own resolution on every platform Rust
/// targets.
#[derive(Debug)]
pub struct SystemMonotonicClock {
    epoch: parking_lot::Mutex<Instant>,
}

const NANOS_PER_SECOND: i64 = 1_000_000_000;

impl Default for SystemMonotonicClock {
    fn default() -> Self {
        Self {
            epoch: parking_lot::Mutex::new(Instant::now()),
        }
    }
}

impl MonotonicClock for SystemMonotonicClock {
    fn elapsed_ticks(&self) -> i64 {
        let epoch = *self.epoch.lock();
        i64::try_from(epoch.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }

    fn frequency(&self) -> i64 {
        NANOS_PER_SECOND
    }

    fn reset(&self) {
        *self.epoch.lock() = Instant::now();
    }
}

/// The default [`WallClock`], backed by [`chrono::Utc::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The default [`IdGenerator`], backed by random (v4) UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> u128 {
        uuid::Uuid::new_v4().as_u128()
    }
}

/// A generator that hands out strictly increasing ids from an atomic counter.
///
/// Cheaper than [`UuidGenerator`] when global uniqueness across process
/// boundaries is not required.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicI64,
}

impl IdGenerator for SequentialIdGenerator {
    fn new_id(&self) -> u128 {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        n as u128
    }
}

/// The overflow-safe formula for converting monotonic elapsed ticks into a
/// wall-clock timestamp, given the frequency the ticks were captured at.
///
/// Per the contract: `adjusted_ticks = elapsed_ticks * (10_000_000 /
/// frequency)` when `frequency` evenly divides 10 MHz, otherwise `(elapsed
/// / frequency) * 10_000_000`, saturating rather than wrapping on overflow.
/// The result is in units of 100ns ticks (matching .NET's `DateTime`
/// resolution, which the original system's duration arithmetic was built
/// around), which callers convert to whatever duration type they need.
pub fn adjusted_100ns_ticks(elapsed_ticks: i64, frequency: i64) -> i64 {
    const TEN_MHZ: i64 = 10_000_000;

    if frequency <= 0 {
        return 0;
    }

    if TEN_MHZ % frequency == 0 {
        let scale = TEN_MHZ / frequency;
        elapsed_ticks.checked_mul(scale).unwrap_or(i64::MAX)
    } else {
        // Either the frequency doesn't evenly divide 10 MHz, or a
        // multiply-first order could overflow; divide first to stay safe,
        // accepting the loss of sub-scale precision.
        (elapsed_ticks / frequency).saturating_mul(TEN_MHZ)
    }
}

/// Computes the wall-clock event time for a record captured at
/// `elapsed_ticks` (relative to `start`), given the clock's `frequency`.
///
/// Clamps/saturates on overflow rather than wrapping, so that
/// `elapsed_ticks == i64::MAX` at a 10 MHz frequency reports `i64::MAX`
/// nanoseconds of offset, not a wrapped
/// negative duration.
pub fn event_time(start: DateTime<Utc>, elapsed_ticks: i64, frequency: i64) -> DateTime<Utc> {
    let hundred_ns = adjusted_100ns_ticks(elapsed_ticks, frequency);
    // 1 tick of 100ns == 100 nanoseconds; saturate the final conversion too.
    let nanos = hundred_ns.checked_mul(100).unwrap_or(i64::MAX);
    // Keep full nanosecond resolution here: truncating to milliseconds would
    // defeat `IntervalTimeUnit::Nanoseconds`, since durations are derived by
    // subtracting two of these timestamps.
    start + chrono::Duration::nanoseconds(nanos)
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Deterministic clock and id doubles for tests.

    use super::*;
    use std::sync::Mutex;

    /// A [`MonotonicClock`] that plays back a fixed sequence of elapsed-tick
    /// values, one per call to [`elapsed_ticks`](MonotonicClock::elapsed_ticks).
    /// Returns the last value forever once the sequence is exhausted.
    pub struct ManualMonotonicClock {
        frequency: i64,
        ticks: Mutex<(Vec<i64>, usize)>,
    }

    impl ManualMonotonicClock {
        /// Creates a clock that will report `ticks[0]`, `ticks[1]`, ... on
        /// successive calls, at the given `frequency`.
        pub fn new(frequency: i64, ticks: Vec<i64>) -> Self {
            Self {
                frequency,
                ticks: Mutex::new((ticks, 0)),
            }
        }
    }

    impl MonotonicClock for ManualMonotonicClock {
        fn elapsed_ticks(&self) -> i64 {
            let mut guard = self.ticks.lock().unwrap();
            let (ticks, idx) = &mut *guard;
            if ticks.is_empty() {
                return 0;
            }
            let i = (*idx).min(ticks.len() - 1);
            let value = ticks[i];
            if *idx < ticks.len() - 1 {
                *idx += 1;
            }
            value
        }

        fn frequency(&self) -> i64 {
            self.frequency
        }

        fn reset(&self) {
            let mut guard = self.ticks.lock().unwrap();
            guard.1 = 0;
        }
    }

    /// A [`WallClock`] that always reports the same fixed instant.
    #[derive(Clone, Copy)]
    pub struct FixedWallClock(pub DateTime<Utc>);

    impl WallClock for FixedWallClock {
        fn utc_now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// An [`IdGenerator`] that hands out `1, 2, 3, ...` so tests can assert
    /// on specific begin-ids.
    #[derive(Default)]
    pub struct SequentialIds(AtomicI64);

    impl IdGenerator for SequentialIds {
        fn new_id(&self) -> u128 {
            (self.0.fetch_add(1, Ordering::Relaxed) + 1) as u128
        }
    }
}
