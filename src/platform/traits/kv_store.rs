//! Key-value store traits
//!
//! [`KeyValueStore`] is the narrow surface the persistence stream writes
//! through: namespace-scoped handles, fixed-width integers, opaque blobs,
//! commit and close. [`StoragePartition`] is the process-wide init / erase
//! surface used once at bootstrap.

use crate::platform::Result;
use nvs_settings_core::{EntryKind, Primitive};

/// Handle open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenMode {
    /// Reads only; fails with `NotFound` if the namespace was never committed
    ReadOnly,
    /// Reads and staged writes, made durable by `commit`
    ReadWrite,
}

/// Opaque handle to an open namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KvHandle(pub u32);

/// Namespace-scoped key-value storage
///
/// Implementations must report a missing key or namespace as
/// `StorageError::NotFound`, distinct from every other failure.
pub trait KeyValueStore: Send + Sync {
    /// Open `namespace` in the given mode
    fn open(&self, namespace: &str, mode: OpenMode) -> Result<KvHandle>;

    /// Read an integer entry written with the same kind
    ///
    /// Returns `TypeMismatch` if the key holds another kind.
    fn get_primitive(&self, handle: KvHandle, key: &str, kind: EntryKind) -> Result<Primitive>;

    /// Stage an integer entry
    fn set_primitive(&self, handle: KvHandle, key: &str, value: Primitive) -> Result<()>;

    /// Stored length of a blob entry
    fn blob_len(&self, handle: KvHandle, key: &str) -> Result<usize>;

    /// Copy a blob entry into `out`, whose length must equal the stored length
    fn get_blob(&self, handle: KvHandle, key: &str, out: &mut [u8]) -> Result<()>;

    /// Stage a blob entry
    fn set_blob(&self, handle: KvHandle, key: &str, data: &[u8]) -> Result<()>;

    /// Make staged writes of `handle` durable
    fn commit(&self, handle: KvHandle) -> Result<()>;

    /// Release `handle`, discarding uncommitted writes
    fn close(&self, handle: KvHandle);
}

/// Process-wide storage area lifecycle
pub trait StoragePartition {
    /// Mount the storage area
    ///
    /// `NoFreePages` and `NewVersionFound` mean the area must be erased
    /// before it can be used.
    fn init(&self) -> Result<()>;

    /// Erase the whole storage area
    fn erase(&self) -> Result<()>;
}
