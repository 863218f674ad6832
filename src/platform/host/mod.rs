//! Host (std) platform implementation
//!
//! Preemptive threads from `std::thread` and a monotonic clock from
//! `std::time::Instant`.

mod clock;
mod spawner;

pub use clock::MonotonicClock;
pub use spawner::{ThreadSpawner, HOST_MIN_STACK};
