//! Core traits for platform-agnostic settings persistence.
//!
//! Trait definitions carry no feature gates. Mock implementations are
//! always available for host testing; platform implementations live in
//! `platform::host`.

pub mod time;

// Re-export traits and mock implementations (always available)
pub use time::{MockTime, TimeSource};
