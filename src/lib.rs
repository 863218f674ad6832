//! nvs_settings - Debounced, typed settings persistence over flash storage
//!
//! This library persists small groups of typed configuration values in a
//! namespaced key-value store and hides the latency of flash commits behind
//! a coalescing write scheduler.
//!
//! # Modules
//!
//! - [`platform`]: flash, key-value store and task spawner traits, with host
//!   and mock implementations
//! - [`core`]: storage engine, persistence stream, settings controller
//! - [`settings`]: concrete settings groups

// Platform abstraction layer
pub mod platform;

// Storage, persistence stream and debounced controller
pub mod core;

// Settings groups
pub mod settings;

pub use nvs_settings_core;

#[doc(hidden)]
pub use log as __log;
