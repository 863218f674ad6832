//! nvs_settings_core - no_std building blocks for flash-backed settings
//!
//! This crate holds the pure parts of the settings stack: byte encodings,
//! the flash image format and the shared error type. It has no platform
//! dependencies and is tested on host.
//!
//! # Modules
//!
//! - [`error`]: Storage error taxonomy
//! - [`name`]: Namespace / key validation
//! - [`value`]: Integer, float and bool encoding (`StoredValue`)
//! - [`codec`]: String and record-array blob layouts
//! - [`image`]: Committed-store image format with CRC32

#![no_std]

pub mod codec;
pub mod error;
pub mod image;
pub mod name;
pub mod value;

pub use bytemuck::{Pod, Zeroable};
pub use error::{FlashError, Result, StorageError};
pub use name::{to_name, validate_name, Name, MAX_NAME_LEN};
pub use value::{EntryKind, Primitive, StoredValue};
