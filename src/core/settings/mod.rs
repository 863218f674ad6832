//! Settings persistence
//!
//! - [`stream`]: typed, namespace-scoped access to a key-value store
//! - [`controller`]: settings group owner with debounced writes
//! - [`config`]: pending-writer configuration

pub mod config;
pub mod controller;
pub mod stream;

pub use config::{WriteFailurePolicy, WriterConfig, WRITER_TASK_NAME};
pub use controller::{SettingsController, SettingsGroup, WriterPhase, WriterStats};
pub use stream::PersistenceStream;
