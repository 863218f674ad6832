//! Platform abstraction layer
//!
//! Flash, key-value storage and task spawning are reached only through the
//! traits in [`traits`]; concrete implementations live in [`host`] (std
//! threads) and [`mock`] (in-memory test doubles).

pub mod error;
pub mod host;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export commonly used types
pub use error::{FlashError, Result, StorageError};
pub use traits::{
    FlashInterface, KeyValueStore, KvHandle, OpenMode, StoragePartition, TaskBody, TaskSpawner,
    TaskSpec,
};
