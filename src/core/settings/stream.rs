//! Typed persistence stream
//!
//! A [`PersistenceStream`] is bound to one namespace of a [`KeyValueStore`]
//! and converts between typed values and the engine's entry kinds:
//!
//! | Type | Stored as |
//! |------|-----------|
//! | `u8`..`i64` | integer entry of the same width |
//! | `f32` | `u32` entry holding the IEEE-754 bit pattern |
//! | `bool` | `u8` entry, `0` or `1` (any non-zero reads `true`) |
//! | `String` | blob of UTF-8 bytes plus one `0x00` |
//! | `[T: Pod]` | blob of the raw records in native layout |
//!
//! Reads never fail: an absent key, a kind mismatch or a malformed blob all
//! yield the caller's default. Writes and commits return their errors.

use crate::platform::{KeyValueStore, KvHandle, OpenMode, Result, StorageError};
use nvs_settings_core::codec::{
    decode_string, encode_string, records_as_bytes, records_as_bytes_mut, string_blob_len,
};
use nvs_settings_core::{to_name, Name, Pod, StoredValue};

/// Namespace-scoped typed access to a key-value store
pub struct PersistenceStream<'a> {
    store: &'a dyn KeyValueStore,
    namespace: Name,
    mode: OpenMode,
    /// `None` for a reading stream over a namespace that was never committed
    handle: Option<KvHandle>,
}

impl<'a> PersistenceStream<'a> {
    /// Open `namespace` for reading
    ///
    /// A namespace that was never written is not an error: the stream comes
    /// back empty and every read returns its default.
    pub fn open_for_reading(store: &'a dyn KeyValueStore, namespace: &str) -> Result<Self> {
        let name = to_name(namespace)?;
        let handle = match store.open(namespace, OpenMode::ReadOnly) {
            Ok(handle) => Some(handle),
            Err(StorageError::NotFound) => {
                crate::log_debug!("Namespace {} not written yet, using defaults", namespace);
                None
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            store,
            namespace: name,
            mode: OpenMode::ReadOnly,
            handle,
        })
    }

    /// Open `namespace` for writing
    pub fn open_for_writing(store: &'a dyn KeyValueStore, namespace: &str) -> Result<Self> {
        let name = to_name(namespace)?;
        let handle = store.open(namespace, OpenMode::ReadWrite)?;
        Ok(Self {
            store,
            namespace: name,
            mode: OpenMode::ReadWrite,
            handle: Some(handle),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// True if the namespace had committed data when opened for reading
    pub fn has_data(&self) -> bool {
        self.handle.is_some()
    }

    fn write_handle(&self) -> Result<KvHandle> {
        match (self.mode, self.handle) {
            (OpenMode::ReadWrite, Some(handle)) => Ok(handle),
            _ => Err(StorageError::ReadOnly),
        }
    }

    fn warn_unreadable(&self, key: &str, error: StorageError) {
        crate::log_warn!(
            "Cannot read {}/{} ({}), using default",
            self.namespace.as_str(),
            key,
            error
        );
    }

    /// Read an integer, `f32` or `bool`, or `default` if it cannot be read
    pub fn get<T: StoredValue>(&self, key: &str, default: T) -> T {
        let Some(handle) = self.handle else {
            return default;
        };
        match self.store.get_primitive(handle, key, T::KIND) {
            Ok(value) => T::from_primitive(value).unwrap_or_else(|| {
                self.warn_unreadable(key, StorageError::TypeMismatch);
                default
            }),
            Err(StorageError::NotFound) => default,
            Err(e) => {
                self.warn_unreadable(key, e);
                default
            }
        }
    }

    /// Stage an integer, `f32` or `bool`
    pub fn set<T: StoredValue>(&self, key: &str, value: T) -> Result<()> {
        self.store
            .set_primitive(self.write_handle()?, key, value.to_primitive())
    }

    /// Load a blob into `out`
    ///
    /// Returns `false` and leaves `out` untouched unless the key holds a blob
    /// of exactly `out.len()` bytes.
    pub fn get_blob(&self, key: &str, out: &mut [u8]) -> bool {
        let Some(handle) = self.handle else {
            return false;
        };
        match self.store.get_blob(handle, key, out) {
            Ok(()) => true,
            Err(StorageError::NotFound) => false,
            Err(e) => {
                self.warn_unreadable(key, e);
                false
            }
        }
    }

    /// Stage a blob
    pub fn set_blob(&self, key: &str, data: &[u8]) -> Result<()> {
        self.store.set_blob(self.write_handle()?, key, data)
    }

    /// Read a string, or `default` if it is absent or malformed
    pub fn get_string(&self, key: &str, default: &str) -> String {
        let Some(handle) = self.handle else {
            return default.to_owned();
        };
        let len = match self.store.blob_len(handle, key) {
            Ok(len) => len,
            Err(StorageError::NotFound) => return default.to_owned(),
            Err(e) => {
                self.warn_unreadable(key, e);
                return default.to_owned();
            }
        };

        let mut blob = vec![0u8; len];
        if !self.get_blob(key, &mut blob) {
            return default.to_owned();
        }
        match decode_string(&blob) {
            Some(value) => value.to_owned(),
            None => {
                self.warn_unreadable(key, StorageError::Corrupted);
                default.to_owned()
            }
        }
    }

    /// Stage a string with its terminator
    pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut blob = vec![0u8; string_blob_len(value)];
        let len = encode_string(value, &mut blob).ok_or(StorageError::InvalidLength)?;
        self.set_blob(key, &blob[..len])
    }

    /// Load an array of `out.len()` records
    ///
    /// Returns `false` and leaves `out` untouched unless the stored blob is
    /// exactly `out.len() * size_of::<T>()` bytes.
    pub fn get_object<T: Pod>(&self, key: &str, out: &mut [T]) -> bool {
        self.get_blob(key, records_as_bytes_mut(out))
    }

    /// Stage an array of records
    pub fn set_object<T: Pod>(&self, key: &str, records: &[T]) -> Result<()> {
        self.set_blob(key, records_as_bytes(records))
    }

    /// Make staged writes durable
    ///
    /// Returns `ReadOnly` on a reading stream.
    pub fn commit(&self) -> Result<()> {
        self.store.commit(self.write_handle()?)
    }

    /// Release the handle, discarding uncommitted writes
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.store.close(handle);
        }
    }
}

impl Drop for PersistenceStream<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
