//! Time abstraction traits for platform-agnostic timing operations.
//!
//! This module provides the `TimeSource` trait that abstracts over clocks
//! (host monotonic clock, mock) so the pending-writer logic can be tested
//! on host with controllable time.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Platform-agnostic time source for deadlines and blocking waits.
///
/// Implementations:
/// - `MonotonicClock` (in `platform::host`) backed by `std::time::Instant`
/// - `MockTime` for host testing with controllable time
///
/// # Example
///
/// ```
/// use nvs_settings::core::traits::{MockTime, TimeSource};
///
/// fn deadline_passed<T: TimeSource>(time: &T, deadline_us: u64) -> bool {
///     time.now_us() >= deadline_us
/// }
///
/// let time = MockTime::new();
/// assert!(!deadline_passed(&time, 1000));
/// time.advance(1000);
/// assert!(deadline_passed(&time, 1000));
/// ```
pub trait TimeSource: Send + Sync {
    /// Returns current time in microseconds since system start.
    fn now_us(&self) -> u64;

    /// Blocks the calling thread for at least `duration_us` microseconds.
    fn sleep_us(&self, duration_us: u64);

    /// Returns current time in milliseconds since system start.
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }

    /// Returns elapsed time in microseconds since a reference point.
    ///
    /// Uses saturating subtraction to handle potential overflow.
    fn elapsed_since(&self, reference_us: u64) -> u64 {
        self.now_us().saturating_sub(reference_us)
    }
}

// ============================================================================
// Mock Implementation (always available for testing)
// ============================================================================

#[derive(Default)]
struct ClockState {
    now_us: u64,
    sleepers: usize,
}

#[derive(Default)]
struct MockClockState {
    clock: Mutex<ClockState>,
    changed: Condvar,
}

impl MockClockState {
    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mock time source for testing with controllable time advancement.
///
/// Clones share the same clock. `sleep_us` blocks until another thread
/// advances the clock past the wake-up time, so a sleeping task makes
/// progress only when the test moves time forward.
///
/// # Example
///
/// ```
/// use nvs_settings::core::traits::{MockTime, TimeSource};
///
/// let time = MockTime::new();
/// assert_eq!(time.now_us(), 0);
///
/// time.advance(1000); // Advance 1ms
/// assert_eq!(time.now_us(), 1000);
/// assert_eq!(time.now_ms(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockTime {
    state: Arc<MockClockState>,
}

impl MockTime {
    /// Creates a new `MockTime` starting at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `MockTime` starting at the specified time.
    pub fn with_initial(us: u64) -> Self {
        let time = Self::new();
        time.set(us);
        time
    }

    /// Sets the current time to an absolute value and wakes sleepers.
    pub fn set(&self, us: u64) {
        let mut clock = self.state.lock();
        clock.now_us = us;
        self.state.changed.notify_all();
    }

    /// Advances the current time by the specified amount and wakes sleepers.
    pub fn advance(&self, us: u64) {
        let mut clock = self.state.lock();
        clock.now_us = clock.now_us.saturating_add(us);
        self.state.changed.notify_all();
    }

    /// Number of threads currently blocked in `sleep_us`.
    pub fn sleepers(&self) -> usize {
        self.state.lock().sleepers
    }

    /// Blocks (in real time) until at least `count` threads are sleeping.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_for_sleepers(&self, count: usize, timeout: Duration) -> bool {
        let clock = self.state.lock();
        let (_clock, result) = self
            .state
            .changed
            .wait_timeout_while(clock, timeout, |c| c.sleepers < count)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }
}

impl TimeSource for MockTime {
    fn now_us(&self) -> u64 {
        self.state.lock().now_us
    }

    fn sleep_us(&self, duration_us: u64) {
        let mut clock = self.state.lock();
        let wake_at = clock.now_us.saturating_add(duration_us);
        clock.sleepers += 1;
        self.state.changed.notify_all();

        while clock.now_us < wake_at {
            clock = self
                .state
                .changed
                .wait(clock)
                .unwrap_or_else(PoisonError::into_inner);
        }

        clock.sleepers -= 1;
        self.state.changed.notify_all();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
