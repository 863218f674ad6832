//! Flash-backed key-value engine
//!
//! [`FlashKvStore`] keeps the committed store in memory and persists it as
//! one CRC-protected image (see `nvs_settings_core::image`) per commit. Images
//! alternate between the blocks of a [`FlashLayout`], so a commit interrupted
//! by power loss leaves the previous image intact and `init` falls back to it.
//!
//! Writes made through a handle are staged on that handle and become visible
//! to other handles only after `commit`.

use crate::platform::{
    FlashError, FlashInterface, KeyValueStore, KvHandle, OpenMode, Result, StorageError,
    StoragePartition,
};
use nvs_settings_core::image::{is_erased, Image, ImageWriter, MAX_ENTRY_DATA};
use nvs_settings_core::{to_name, EntryKind, Name, Primitive};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Placement of the settings blocks in flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashLayout {
    /// Address of the first block (block-aligned)
    pub base_address: u32,
    /// Number of blocks used in rotation (at least 1)
    pub block_count: u8,
}

impl FlashLayout {
    /// Address of block `block_id`
    pub fn block_address(&self, block_id: u8, block_size: u32) -> u32 {
        self.base_address + u32::from(block_id) * block_size
    }
}

impl Default for FlashLayout {
    /// Two blocks right after a 256 KB firmware region
    fn default() -> Self {
        Self {
            base_address: 0x040000,
            block_count: 2,
        }
    }
}

/// Engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Commits that reached flash since mount
    pub commits: u32,
    /// Block holding the newest image
    pub active_block: Option<u8>,
    /// Sequence number of the newest image
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    kind: EntryKind,
    data: Vec<u8>,
}

type EntryMap = BTreeMap<(Name, Name), Entry>;

#[derive(Debug)]
struct OpenHandle {
    namespace: Name,
    mode: OpenMode,
    staged: BTreeMap<Name, Entry>,
}

struct Inner<F> {
    flash: F,
    initialized: bool,
    committed: EntryMap,
    handles: HashMap<u32, OpenHandle>,
    next_handle: u32,
    stats: EngineStats,
}

impl<F> Inner<F> {
    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    fn handle(&self, handle: KvHandle) -> Result<&OpenHandle> {
        self.ensure_initialized()?;
        self.handles
            .get(&handle.0)
            .ok_or(StorageError::InvalidHandle)
    }

    fn writable_handle(&mut self, handle: KvHandle) -> Result<&mut OpenHandle> {
        self.ensure_initialized()?;
        let open = self
            .handles
            .get_mut(&handle.0)
            .ok_or(StorageError::InvalidHandle)?;
        if open.mode != OpenMode::ReadWrite {
            return Err(StorageError::ReadOnly);
        }
        Ok(open)
    }

    /// Staged entry of this handle, else the committed one
    fn lookup(&self, handle: KvHandle, key: &str) -> Result<&Entry> {
        let open = self.handle(handle)?;
        let key = to_name(key)?;
        if let Some(entry) = open.staged.get(&key) {
            return Ok(entry);
        }
        self.committed
            .get(&(open.namespace.clone(), key))
            .ok_or(StorageError::NotFound)
    }

    fn stage(&mut self, handle: KvHandle, key: &str, entry: Entry) -> Result<()> {
        let key = to_name(key)?;
        self.writable_handle(handle)?.staged.insert(key, entry);
        Ok(())
    }
}

/// Key-value engine persisting to a [`FlashInterface`]
///
/// # Example
///
/// ```
/// use nvs_settings::core::storage::FlashKvStore;
/// use nvs_settings::platform::mock::MockFlash;
/// use nvs_settings::platform::traits::{KeyValueStore, OpenMode, StoragePartition};
/// use nvs_settings_core::{EntryKind, Primitive};
///
/// let store = FlashKvStore::new(MockFlash::new());
/// store.init().unwrap();
///
/// let handle = store.open("display", OpenMode::ReadWrite).unwrap();
/// store.set_primitive(handle, "bright", Primitive::U8(80)).unwrap();
/// store.commit(handle).unwrap();
/// store.close(handle);
///
/// let handle = store.open("display", OpenMode::ReadOnly).unwrap();
/// assert_eq!(
///     store.get_primitive(handle, "bright", EntryKind::U8),
///     Ok(Primitive::U8(80))
/// );
/// ```
pub struct FlashKvStore<F: FlashInterface> {
    layout: FlashLayout,
    inner: Mutex<Inner<F>>,
}

impl<F: FlashInterface> FlashKvStore<F> {
    /// Create an engine with the default layout
    ///
    /// The engine must be mounted with `init` before use.
    pub fn new(flash: F) -> Self {
        Self::with_layout(flash, FlashLayout::default())
    }

    /// Create an engine with an explicit layout
    pub fn with_layout(flash: F, layout: FlashLayout) -> Self {
        Self {
            layout,
            inner: Mutex::new(Inner {
                flash,
                initialized: false,
                committed: BTreeMap::new(),
                handles: HashMap::new(),
                next_handle: 1,
                stats: EngineStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<F>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get engine statistics
    pub fn stats(&self) -> EngineStats {
        self.lock().stats
    }

    /// Number of currently open handles
    pub fn open_handles(&self) -> usize {
        self.lock().handles.len()
    }

    /// Get Flash interface back (for reboot simulation)
    pub fn into_flash(self) -> F {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .flash
    }

    fn validate_layout(&self, flash: &F) -> Result<()> {
        let block_size = u64::from(flash.block_size());
        let end = u64::from(self.layout.base_address)
            + u64::from(self.layout.block_count) * block_size;
        if self.layout.block_count == 0
            || !u64::from(self.layout.base_address).is_multiple_of(block_size)
            || end > u64::from(flash.capacity())
        {
            return Err(FlashError::InvalidAddress.into());
        }
        Ok(())
    }

    /// Serialize `entries` and write them into `block_id`
    fn write_image(&self, flash: &mut F, entries: &EntryMap, block_id: u8, sequence: u32) -> Result<()> {
        let block_size = flash.block_size();
        let mut buf = vec![0xFFu8; block_size as usize];

        let mut writer = ImageWriter::new(&mut buf)?;
        for ((namespace, key), entry) in entries {
            writer.push(namespace, key, entry.kind, &entry.data)?;
        }
        let len = writer.finish(sequence);

        let address = self.layout.block_address(block_id, block_size);
        flash.erase(address, block_size)?;
        flash.write(address, &buf[..len])?;
        Ok(())
    }

    /// Decode the committed map stored in `block_id`
    fn load_block(&self, flash: &mut F, block_id: u8, buf: &mut [u8]) -> Result<EntryMap> {
        let address = self.layout.block_address(block_id, flash.block_size());
        flash.read(address, buf)?;

        let image = Image::parse(buf)?;
        let mut entries = EntryMap::new();
        for entry in image.entries() {
            let entry = entry?;
            entries.insert(
                (to_name(entry.namespace)?, to_name(entry.key)?),
                Entry {
                    kind: entry.kind,
                    data: entry.data.to_vec(),
                },
            );
        }
        Ok(entries)
    }
}

impl<F: FlashInterface> StoragePartition for FlashKvStore<F> {
    fn init(&self) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        self.validate_layout(&inner.flash)?;

        let block_size = inner.flash.block_size();
        let mut buf = vec![0u8; block_size as usize];
        let mut newest: Option<(u8, u32)> = None;
        let mut saw_erased = false;
        let mut saw_other_version = false;

        for block_id in 0..self.layout.block_count {
            let address = self.layout.block_address(block_id, block_size);
            inner.flash.read(address, &mut buf)?;

            if is_erased(&buf) {
                saw_erased = true;
                continue;
            }

            match Image::parse(&buf) {
                Ok(image) => {
                    let sequence = image.header.sequence;
                    if newest.is_none_or(|(_, best)| sequence > best) {
                        newest = Some((block_id, sequence));
                    }
                }
                Err(StorageError::NewVersionFound) => saw_other_version = true,
                Err(e) => {
                    crate::log_warn!("Skipping settings block {}: {}", block_id, e);
                }
            }
        }

        let (committed, stats) = match newest {
            Some((block_id, sequence)) => {
                let entries = self.load_block(&mut inner.flash, block_id, &mut buf)?;
                crate::log_info!(
                    "Mounted settings block {} (sequence {}, {} entries)",
                    block_id,
                    sequence,
                    entries.len()
                );
                let stats = EngineStats {
                    commits: 0,
                    active_block: Some(block_id),
                    sequence,
                };
                (entries, stats)
            }
            None if saw_other_version => return Err(StorageError::NewVersionFound),
            None if !saw_erased => return Err(StorageError::NoFreePages),
            None => {
                crate::log_info!("No settings image found, starting empty");
                (EntryMap::new(), EngineStats::default())
            }
        };

        inner.committed = committed;
        inner.stats = stats;
        inner.handles.clear();
        inner.initialized = true;
        Ok(())
    }

    fn erase(&self) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        self.validate_layout(&inner.flash)?;

        let block_size = inner.flash.block_size();
        for block_id in 0..self.layout.block_count {
            inner
                .flash
                .erase(self.layout.block_address(block_id, block_size), block_size)?;
        }

        inner.committed.clear();
        inner.handles.clear();
        inner.stats = EngineStats::default();
        inner.initialized = false;
        crate::log_info!("Erased {} settings blocks", self.layout.block_count);
        Ok(())
    }
}

impl<F: FlashInterface> KeyValueStore for FlashKvStore<F> {
    fn open(&self, namespace: &str, mode: OpenMode) -> Result<KvHandle> {
        let mut inner = self.lock();
        inner.ensure_initialized()?;
        let namespace = to_name(namespace)?;

        if mode == OpenMode::ReadOnly && !inner.committed.keys().any(|(ns, _)| *ns == namespace) {
            return Err(StorageError::NotFound);
        }

        let id = inner.next_handle;
        inner.next_handle = inner.next_handle.wrapping_add(1).max(1);
        inner.handles.insert(
            id,
            OpenHandle {
                namespace,
                mode,
                staged: BTreeMap::new(),
            },
        );
        Ok(KvHandle(id))
    }

    fn get_primitive(&self, handle: KvHandle, key: &str, kind: EntryKind) -> Result<Primitive> {
        let inner = self.lock();
        let entry = inner.lookup(handle, key)?;
        if entry.kind != kind {
            return Err(StorageError::TypeMismatch);
        }
        Primitive::from_le_bytes(kind, &entry.data)
    }

    fn set_primitive(&self, handle: KvHandle, key: &str, value: Primitive) -> Result<()> {
        let (bytes, len) = value.to_le_bytes();
        let entry = Entry {
            kind: value.kind(),
            data: bytes[..len].to_vec(),
        };
        self.lock().stage(handle, key, entry)
    }

    fn blob_len(&self, handle: KvHandle, key: &str) -> Result<usize> {
        let inner = self.lock();
        let entry = inner.lookup(handle, key)?;
        if entry.kind != EntryKind::Blob {
            return Err(StorageError::TypeMismatch);
        }
        Ok(entry.data.len())
    }

    fn get_blob(&self, handle: KvHandle, key: &str, out: &mut [u8]) -> Result<()> {
        let inner = self.lock();
        let entry = inner.lookup(handle, key)?;
        if entry.kind != EntryKind::Blob {
            return Err(StorageError::TypeMismatch);
        }
        if entry.data.len() != out.len() {
            return Err(StorageError::InvalidLength);
        }
        out.copy_from_slice(&entry.data);
        Ok(())
    }

    fn set_blob(&self, handle: KvHandle, key: &str, data: &[u8]) -> Result<()> {
        if data.len() > MAX_ENTRY_DATA {
            return Err(StorageError::NotEnoughSpace);
        }
        let entry = Entry {
            kind: EntryKind::Blob,
            data: data.to_vec(),
        };
        self.lock().stage(handle, key, entry)
    }

    fn commit(&self, handle: KvHandle) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let open = inner.writable_handle(handle)?;
        if open.staged.is_empty() {
            return Ok(());
        }
        let namespace = open.namespace.clone();
        let staged = std::mem::take(&mut open.staged);

        let mut merged = inner.committed.clone();
        for (key, entry) in &staged {
            merged.insert((namespace.clone(), key.clone()), entry.clone());
        }

        let block_id = match inner.stats.active_block {
            Some(active) => (active + 1) % self.layout.block_count,
            None => 0,
        };
        let sequence = inner.stats.sequence.wrapping_add(1);

        if let Err(e) = self.write_image(&mut inner.flash, &merged, block_id, sequence) {
            // Keep the writes staged so the handle state matches the flash state
            if let Some(open) = inner.handles.get_mut(&handle.0) {
                open.staged = staged;
            }
            crate::log_error!("Settings commit for {} failed: {}", namespace.as_str(), e);
            return Err(e);
        }

        inner.committed = merged;
        inner.stats.commits += 1;
        inner.stats.active_block = Some(block_id);
        inner.stats.sequence = sequence;
        crate::log_debug!(
            "Committed {} to block {} (sequence {})",
            namespace.as_str(),
            block_id,
            sequence
        );
        Ok(())
    }

    fn close(&self, handle: KvHandle) {
        self.lock().handles.remove(&handle.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::flash::BLOCK_SIZE;
    use crate::platform::mock::MockFlash;

    const BLOCK_0: u32 = 0x040000;
    const BLOCK_1: u32 = 0x041000;

    fn mounted(flash: &MockFlash) -> FlashKvStore<MockFlash> {
        let store = FlashKvStore::new(flash.clone());
        store.init().unwrap();
        store
    }

    fn write_u8(store: &FlashKvStore<MockFlash>, ns: &str, key: &str, value: u8) {
        let handle = store.open(ns, OpenMode::ReadWrite).unwrap();
        store.set_primitive(handle, key, Primitive::U8(value)).unwrap();
        store.commit(handle).unwrap();
        store.close(handle);
    }

    fn read_u8(store: &FlashKvStore<MockFlash>, ns: &str, key: &str) -> Result<u8> {
        let handle = store.open(ns, OpenMode::ReadOnly)?;
        let value = store.get_primitive(handle, key, EntryKind::U8);
        store.close(handle);
        match value? {
            Primitive::U8(v) => Ok(v),
            _ => Err(StorageError::TypeMismatch),
        }
    }

    #[test]
    fn test_requires_init() {
        let store = FlashKvStore::new(MockFlash::new());
        assert_eq!(
            store.open("display", OpenMode::ReadWrite),
            Err(StorageError::NotInitialized)
        );
    }

    #[test]
    fn test_fresh_flash_mounts_empty() {
        let flash = MockFlash::new();
        let store = mounted(&flash);
        assert_eq!(store.stats(), EngineStats::default());
        assert_eq!(
            store.open("display", OpenMode::ReadOnly),
            Err(StorageError::NotFound)
        );
    }

    #[test]
    fn test_commit_and_remount() {
        let flash = MockFlash::new();
        let store = mounted(&flash);
        write_u8(&store, "display", "bright", 80);

        let rebooted = FlashKvStore::new(store.into_flash());
        rebooted.init().unwrap();
        assert_eq!(read_u8(&rebooted, "display", "bright"), Ok(80));
        assert_eq!(rebooted.stats().sequence, 1);
    }

    #[test]
    fn test_staged_writes_are_private_until_commit() {
        let store = mounted(&MockFlash::new());
        write_u8(&store, "display", "bright", 10);

        let writer = store.open("display", OpenMode::ReadWrite).unwrap();
        store.set_primitive(writer, "bright", Primitive::U8(20)).unwrap();

        // Same handle sees its own staged write
        assert_eq!(
            store.get_primitive(writer, "bright", EntryKind::U8),
            Ok(Primitive::U8(20))
        );
        // Other handles see the committed value
        assert_eq!(read_u8(&store, "display", "bright"), Ok(10));

        store.commit(writer).unwrap();
        assert_eq!(read_u8(&store, "display", "bright"), Ok(20));
        store.close(writer);
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn test_close_discards_uncommitted_writes() {
        let flash = MockFlash::new();
        let store = mounted(&flash);

        let handle = store.open("display", OpenMode::ReadWrite).unwrap();
        store.set_primitive(handle, "bright", Primitive::U8(5)).unwrap();
        store.close(handle);

        assert_eq!(read_u8(&store, "display", "bright"), Err(StorageError::NotFound));
        assert_eq!(flash.get_write_count(), 0);
    }

    #[test]
    fn test_type_and_length_checks() {
        let store = mounted(&MockFlash::new());
        let handle = store.open("misc", OpenMode::ReadWrite).unwrap();
        store.set_primitive(handle, "num", Primitive::U16(7)).unwrap();
        store.set_blob(handle, "blob", &[1, 2, 3]).unwrap();

        assert_eq!(
            store.get_primitive(handle, "num", EntryKind::U8),
            Err(StorageError::TypeMismatch)
        );
        assert_eq!(store.blob_len(handle, "num"), Err(StorageError::TypeMismatch));
        assert_eq!(store.blob_len(handle, "blob"), Ok(3));

        let mut short = [0u8; 2];
        assert_eq!(
            store.get_blob(handle, "blob", &mut short),
            Err(StorageError::InvalidLength)
        );
        let mut exact = [0u8; 3];
        store.get_blob(handle, "blob", &mut exact).unwrap();
        assert_eq!(exact, [1, 2, 3]);
    }

    #[test]
    fn test_read_only_handle_rejects_writes() {
        let store = mounted(&MockFlash::new());
        write_u8(&store, "display", "bright", 1);

        let handle = store.open("display", OpenMode::ReadOnly).unwrap();
        assert_eq!(
            store.set_primitive(handle, "bright", Primitive::U8(2)),
            Err(StorageError::ReadOnly)
        );
        assert_eq!(store.commit(handle), Err(StorageError::ReadOnly));
    }

    #[test]
    fn test_invalid_names_and_handles() {
        let store = mounted(&MockFlash::new());
        assert_eq!(
            store.open("a_namespace_too_long", OpenMode::ReadWrite),
            Err(StorageError::InvalidName)
        );

        let handle = store.open("display", OpenMode::ReadWrite).unwrap();
        assert_eq!(
            store.set_primitive(handle, "", Primitive::U8(1)),
            Err(StorageError::InvalidName)
        );

        store.close(handle);
        assert_eq!(store.commit(handle), Err(StorageError::InvalidHandle));
    }

    #[test]
    fn test_blocks_alternate() {
        let flash = MockFlash::new();
        let store = mounted(&flash);

        write_u8(&store, "display", "bright", 1);
        write_u8(&store, "display", "bright", 2);
        write_u8(&store, "display", "bright", 3);

        assert_eq!(flash.get_erase_count(BLOCK_0), 2);
        assert_eq!(flash.get_erase_count(BLOCK_1), 1);

        let stats = store.stats();
        assert_eq!(stats.commits, 3);
        assert_eq!(stats.active_block, Some(0));
        assert_eq!(stats.sequence, 3);
    }

    #[test]
    fn test_corrupted_newest_block_falls_back() {
        let flash = MockFlash::new();
        let store = mounted(&flash);
        write_u8(&store, "display", "bright", 1); // block 0, sequence 1
        write_u8(&store, "display", "bright", 2); // block 1, sequence 2
        drop(store);

        flash.inject_corruption(BLOCK_1 + 20, 4);

        let rebooted = mounted(&flash);
        assert_eq!(read_u8(&rebooted, "display", "bright"), Ok(1));
        assert_eq!(rebooted.stats().active_block, Some(0));
    }

    #[test]
    fn test_power_loss_keeps_previous_image() {
        let flash = MockFlash::new();
        let store = mounted(&flash);
        write_u8(&store, "display", "bright", 1);

        flash.simulate_power_loss();
        write_u8(&store, "display", "bright", 2);
        drop(store);

        let rebooted = mounted(&flash);
        assert_eq!(read_u8(&rebooted, "display", "bright"), Ok(1));
    }

    #[test]
    fn test_failed_commit_keeps_committed_state() {
        let flash = MockFlash::new();
        let store = mounted(&flash);
        write_u8(&store, "display", "bright", 1);

        let handle = store.open("display", OpenMode::ReadWrite).unwrap();
        store.set_primitive(handle, "bright", Primitive::U8(9)).unwrap();
        flash.fail_next_write();
        assert_eq!(
            store.commit(handle),
            Err(StorageError::Flash(FlashError::WriteFailed))
        );
        assert_eq!(read_u8(&store, "display", "bright"), Ok(1));

        // Writes stay staged and the retry succeeds
        store.commit(handle).unwrap();
        assert_eq!(read_u8(&store, "display", "bright"), Ok(9));
    }

    #[test]
    fn test_image_larger_than_block() {
        let store = mounted(&MockFlash::new());
        let handle = store.open("big", OpenMode::ReadWrite).unwrap();
        store
            .set_blob(handle, "payload", &vec![0x5A; BLOCK_SIZE as usize])
            .unwrap();
        assert_eq!(store.commit(handle), Err(StorageError::NotEnoughSpace));
        assert_eq!(store.stats().commits, 0);
    }

    #[test]
    fn test_other_format_version_requires_erase() {
        let flash = MockFlash::new();
        let store = mounted(&flash);
        write_u8(&store, "display", "bright", 1);
        drop(store);

        // Bump the version field of the only image
        flash.poke(BLOCK_0 + 4, &[0x02, 0x00]);

        let store = FlashKvStore::new(flash.clone());
        assert_eq!(store.init(), Err(StorageError::NewVersionFound));

        store.erase().unwrap();
        store.init().unwrap();
        assert_eq!(
            store.open("display", OpenMode::ReadOnly),
            Err(StorageError::NotFound)
        );
    }

    #[test]
    fn test_garbage_everywhere_reports_no_free_pages() {
        let flash = MockFlash::new();
        flash.poke(BLOCK_0, &[0u8; 32]);
        flash.poke(BLOCK_1, &[0u8; 32]);

        let store = FlashKvStore::new(flash.clone());
        assert_eq!(store.init(), Err(StorageError::NoFreePages));
    }

    #[test]
    fn test_erase_unmounts() {
        let flash = MockFlash::new();
        let store = mounted(&flash);
        write_u8(&store, "display", "bright", 1);

        store.erase().unwrap();
        assert_eq!(
            store.open("display", OpenMode::ReadWrite),
            Err(StorageError::NotInitialized)
        );
        assert!(flash.get_contents(BLOCK_0, 16).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_invalid_layout() {
        let layout = FlashLayout {
            base_address: 0x040100,
            block_count: 2,
        };
        let store = FlashKvStore::with_layout(MockFlash::new(), layout);
        assert_eq!(
            store.init(),
            Err(StorageError::Flash(FlashError::InvalidAddress))
        );
    }
}
