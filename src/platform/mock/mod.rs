//! Mock platform implementation for testing
//!
//! This module provides mock implementations of platform traits that can be used
//! for unit testing without requiring actual hardware.
//!
//! # Feature Gate
//!
//! This module is available in two contexts:
//! - During test builds (`#[cfg(test)]`)
//! - When the `mock` feature is enabled (on by default)

#![cfg(any(test, feature = "mock"))]

pub mod flash;
mod spawner;

pub use flash::MockFlash;
pub use spawner::RecordingSpawner;
