//! Storage bootstrap
//!
//! Mounts the storage partition once at startup. A partition that has no
//! free pages or was written by a newer format is erased and mounted again.

use crate::core::fatal::abort_on;
use crate::platform::{Result, StoragePartition};

/// Mount `partition`, erasing and retrying once if it requires it
///
/// # Errors
///
/// Returns the error of `init` when it does not call for an erase, the error
/// of `erase`, or the error of the retried `init`.
pub fn initialize<P: StoragePartition + ?Sized>(partition: &P) -> Result<()> {
    match partition.init() {
        Ok(()) => Ok(()),
        Err(e) if e.requires_erase() => {
            crate::log_warn!("Settings storage unusable ({}), erasing", e);
            partition.erase()?;
            partition.init()
        }
        Err(e) => Err(e),
    }
}

/// Mount `partition` or abort the process
pub fn initialize_or_abort<P: StoragePartition + ?Sized>(partition: &P) {
    if let Err(e) = initialize(partition) {
        abort_on("settings storage init", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::FlashKvStore;
    use crate::platform::mock::MockFlash;
    use crate::platform::{FlashError, KeyValueStore, OpenMode, StorageError};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Partition replaying scripted `init` results
    struct ScriptedPartition {
        init_results: RefCell<VecDeque<Result<()>>>,
        calls: RefCell<Vec<&'static str>>,
    }

    impl ScriptedPartition {
        fn new(results: &[Result<()>]) -> Self {
            Self {
                init_results: RefCell::new(results.iter().copied().collect()),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.borrow().clone()
        }
    }

    impl StoragePartition for ScriptedPartition {
        fn init(&self) -> Result<()> {
            self.calls.borrow_mut().push("init");
            self.init_results.borrow_mut().pop_front().unwrap_or(Ok(()))
        }

        fn erase(&self) -> Result<()> {
            self.calls.borrow_mut().push("erase");
            Ok(())
        }
    }

    #[test]
    fn test_clean_init() {
        let partition = ScriptedPartition::new(&[Ok(())]);
        assert_eq!(initialize(&partition), Ok(()));
        assert_eq!(partition.calls(), vec!["init"]);
    }

    #[test]
    fn test_erase_and_retry() {
        for error in [StorageError::NoFreePages, StorageError::NewVersionFound] {
            let partition = ScriptedPartition::new(&[Err(error), Ok(())]);
            assert_eq!(initialize(&partition), Ok(()));
            assert_eq!(partition.calls(), vec!["init", "erase", "init"]);
        }
    }

    #[test]
    fn test_retry_happens_once() {
        let partition = ScriptedPartition::new(&[
            Err(StorageError::NoFreePages),
            Err(StorageError::NoFreePages),
        ]);
        assert_eq!(initialize(&partition), Err(StorageError::NoFreePages));
        assert_eq!(partition.calls(), vec!["init", "erase", "init"]);
    }

    #[test]
    fn test_other_errors_are_returned() {
        let error = StorageError::Flash(FlashError::ReadFailed);
        let partition = ScriptedPartition::new(&[Err(error)]);
        assert_eq!(initialize(&partition), Err(error));
        assert_eq!(partition.calls(), vec!["init"]);
    }

    #[test]
    fn test_recovers_foreign_version_on_flash() {
        let flash = MockFlash::new();
        let store = FlashKvStore::new(flash.clone());
        initialize(&store).unwrap();

        let handle = store.open("display", OpenMode::ReadWrite).unwrap();
        store
            .set_primitive(handle, "bright", nvs_settings_core::Primitive::U8(1))
            .unwrap();
        store.commit(handle).unwrap();
        store.close(handle);
        drop(store);

        flash.poke(0x040004, &[0x09, 0x00]);

        let store = FlashKvStore::new(flash.clone());
        initialize(&store).unwrap();
        assert_eq!(
            store.open("display", OpenMode::ReadOnly),
            Err(StorageError::NotFound)
        );
    }
}
