//! Platform error types
//!
//! The error taxonomy lives in `nvs_settings_core` so the no_std codec and
//! the platform layer report failures with the same type.

pub use nvs_settings_core::error::{FlashError, Result, StorageError};
