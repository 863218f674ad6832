//! Platform abstraction traits
//!
//! This module defines the traits that platform implementations must provide.

pub mod flash;
pub mod kv_store;
pub mod spawner;

// Re-export trait interfaces
pub use flash::FlashInterface;
pub use kv_store::{KeyValueStore, KvHandle, OpenMode, StoragePartition};
pub use spawner::{TaskBody, TaskSpawner, TaskSpec};
