//! Storage error types
//!
//! Every layer of the settings stack (flash, engine, stream, controller)
//! reports failures through [`StorageError`]. Engines map their
//! backend-specific errors to these variants.

use core::fmt;

/// Result type for storage operations
pub type Result<T> = core::result::Result<T, StorageError>;

/// Storage-level errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Engine used before `init`
    NotInitialized,
    /// Key or namespace does not exist
    NotFound,
    /// Entry exists but was written with a different accessor
    TypeMismatch,
    /// Caller buffer length differs from the stored length
    InvalidLength,
    /// Namespace or key is empty, too long or contains NUL
    InvalidName,
    /// Handle is closed or unknown
    InvalidHandle,
    /// Write attempted through a read-only handle
    ReadOnly,
    /// Committed image does not fit in one storage block
    NotEnoughSpace,
    /// Storage area holds no free and no valid block (erase required)
    NoFreePages,
    /// Storage area was written by another format version (erase required)
    NewVersionFound,
    /// Stored data failed validation
    Corrupted,
    /// Background task could not be started
    SpawnFailed,
    /// Flash operation failed
    Flash(FlashError),
}

/// Flash-specific errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Address out of range, unaligned or inside the protected region
    InvalidAddress,
    /// Read operation failed
    ReadFailed,
    /// Write operation failed
    WriteFailed,
    /// Erase operation failed
    EraseFailed,
}

impl StorageError {
    /// Init-time conditions that are cleared by erasing the storage area
    pub fn requires_erase(&self) -> bool {
        matches!(
            self,
            StorageError::NoFreePages | StorageError::NewVersionFound
        )
    }
}

impl From<FlashError> for StorageError {
    fn from(e: FlashError) -> Self {
        StorageError::Flash(e)
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotInitialized => write!(f, "storage not initialized"),
            StorageError::NotFound => write!(f, "not found"),
            StorageError::TypeMismatch => write!(f, "stored type differs from requested type"),
            StorageError::InvalidLength => write!(f, "stored length differs from buffer length"),
            StorageError::InvalidName => write!(f, "invalid namespace or key name"),
            StorageError::InvalidHandle => write!(f, "invalid handle"),
            StorageError::ReadOnly => write!(f, "handle is read-only"),
            StorageError::NotEnoughSpace => write!(f, "not enough space in storage block"),
            StorageError::NoFreePages => write!(f, "no free pages in storage area"),
            StorageError::NewVersionFound => write!(f, "storage written by another format version"),
            StorageError::Corrupted => write!(f, "stored data corrupted"),
            StorageError::SpawnFailed => write!(f, "failed to spawn task"),
            StorageError::Flash(e) => write!(f, "flash error: {}", e),
        }
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::InvalidAddress => write!(f, "invalid address"),
            FlashError::ReadFailed => write!(f, "read failed"),
            FlashError::WriteFailed => write!(f, "write failed"),
            FlashError::EraseFailed => write!(f, "erase failed"),
        }
    }
}
