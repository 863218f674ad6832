//! Settings storage
//!
//! - [`engine`]: flash-backed key-value engine (`FlashKvStore`)
//! - [`bootstrap`]: one-time mount with erase-and-retry

pub mod bootstrap;
pub mod engine;

pub use bootstrap::{initialize, initialize_or_abort};
pub use engine::{EngineStats, FlashKvStore, FlashLayout};
